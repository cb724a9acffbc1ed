//! # tribunal-core
//!
//! Deterministic domain logic for multi-agent transaction fraud scoring.
//!
//! This crate holds everything in the pipeline that does not touch the
//! outside world:
//! - signal derivation from the customer profile
//! - retrieval scoring and model-response parsing
//! - threat baseline, evidence aggregation and the arbiter
//! - debate and explanation fallbacks
//! - the write-once orchestrator state
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same inputs always produce the same decision
//! 2. **No I/O**: model calls, retrieval and lookups live in `tribunal-runtime`
//! 3. **Total**: every fallback is a pure function that cannot fail
//!
//! ## Example
//!
//! ```rust,ignore
//! use tribunal_core::{signals, EvidenceAggregator, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! let derived = signals::derive(&transaction, &behavior);
//! let evidence = EvidenceAggregator::new(config.aggregation, config.thresholds)
//!     .aggregate(&policy, &derived.behavioral, &threat);
//! println!("{} risk ({:.1})", evidence.risk_category, evidence.composite_risk_score);
//! ```

pub mod aggregator;
pub mod arbiter;
pub mod config;
pub mod debate;
pub mod explanation;
pub mod parser;
pub mod retrieval;
pub mod signals;
pub mod state;
pub mod threat;
pub mod types;

// Re-export main types at crate root
pub use aggregator::EvidenceAggregator;
pub use arbiter::DecisionArbiter;
pub use config::{ConfigError, PipelineConfig};
pub use explanation::ExplanationFacts;
pub use parser::ParseFailure;
pub use retrieval::ScoredChunk;
pub use state::{
    FailureKind, FallbackBranch, FallbackRecord, LlmUsage, OrchestratorState, Phase, StateError,
};
pub use types::{
    AggregatedEvidence, Argument, ArgumentOrigin, BehavioralSignals, CustomerBehavior,
    DebateArguments, Decision, DerivedSignals, EscalationReason, ExplanationLevel,
    ExplanationResult, FraudDecision, HourRange, PolicyMatch, PolicyMatchResult,
    ProCustomerHalf, ProFraudHalf, RetrievedChunk, RiskCategory, RiskComponents, SourceKind,
    Stance, ThreatIntelResult, ThreatSource, Transaction, TransactionSignals,
};
