//! # tribunal-runtime
//!
//! Async pipeline controller for multi-agent fraud scoring.
//!
//! This crate wires the deterministic domain in `tribunal-core` to the
//! outside world: the language model, the policy index and the threat-intel
//! providers. Every external call has a deadline and a deterministic
//! fallback, so a run always ends in a decision and an explanation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tribunal_runtime::{FraudPipeline, InMemoryPolicyIndex, OfflineProvider};
//!
//! let pipeline = FraudPipeline::builder()
//!     .config(config)
//!     .provider(Arc::new(OfflineProvider::new()))
//!     .index(Arc::new(InMemoryPolicyIndex::from_path("policies.yaml")?))
//!     .build()?;
//!
//! let outcome = pipeline.run(transaction, behavior).await?;
//! println!("{} ({:.2})", outcome.decision.decision, outcome.decision.confidence);
//! ```

pub mod agents;
pub mod cache;
pub mod generation;
pub mod intel;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod retrieval;

#[cfg(test)]
mod testing;

pub use generation::{CallFailure, CallSite, Generation, Generator};
pub use intel::{ProviderGatherer, ThreatLookup, ThreatProvider, ThreatProviderError};
pub use orchestrator::{FraudPipeline, FraudPipelineBuilder, PipelineError, PipelineOutcome};
pub use providers::{LlmProvider, OfflineProvider, ProviderError};
pub use retrieval::{IndexError, InMemoryPolicyIndex, PolicyIndex, PolicyRetriever};
