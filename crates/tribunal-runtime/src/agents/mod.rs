//! Model-backed agents.
//!
//! Every agent returns a well-formed result whether or not the model
//! answered. A failed call is reported alongside the result as a
//! `FallbackRecord` for the orchestrator to log and trace.

mod debater;
mod explainer;
mod policy_matcher;

pub use debater::{DebateEvaluator, DebateOutcome};
pub use explainer::{ExplanationOutcome, ExplanationWriter};
pub use policy_matcher::{build_query, PolicyMatchOutcome, PolicyMatcher};
