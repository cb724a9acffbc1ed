//! Per-run orchestrator state.
//!
//! One `OrchestratorState` is owned by exactly one pipeline run. Each phase
//! output is an `Option` written once through a setter that refuses a second
//! write, so no later phase can mutate an earlier phase's output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::{
    AggregatedEvidence, CustomerBehavior, DebateArguments, DerivedSignals, ExplanationResult,
    FraudDecision, PolicyMatchResult, ThreatIntelResult, Transaction,
};

/// Errors from violating the write-once discipline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("State field '{field}' was already written")]
    AlreadyWritten { field: &'static str },

    #[error("State field '{field}' is required by {phase} but was never written")]
    Missing { field: &'static str, phase: Phase },
}

/// The five pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Context,
    Evidence,
    Debate,
    Decision,
    Explanation,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Context => "context",
            Phase::Evidence => "evidence",
            Phase::Debate => "debate",
            Phase::Decision => "decision",
            Phase::Explanation => "explanation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an external call did not produce a usable result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Error,
    ParseFailed,
    CircuitOpen,
    Panicked,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Error => "error",
            FailureKind::ParseFailed => "parse_failed",
            FailureKind::CircuitOpen => "circuit_open",
            FailureKind::Panicked => "panicked",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which deterministic branch replaced the failed result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FallbackBranch {
    DeterministicArgument,
    RetrievalHits,
    EmptyPolicyResult,
    TemplateExplanation,
    MinimalExplanation,
    ProviderSkipped,
}

impl FallbackBranch {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackBranch::DeterministicArgument => "deterministic_argument",
            FallbackBranch::RetrievalHits => "retrieval_hits",
            FallbackBranch::EmptyPolicyResult => "empty_policy_result",
            FallbackBranch::TemplateExplanation => "template_explanation",
            FallbackBranch::MinimalExplanation => "minimal_explanation",
            FallbackBranch::ProviderSkipped => "provider_skipped",
        }
    }
}

impl fmt::Display for FallbackBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the fallback trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FallbackRecord {
    pub phase: Phase,
    /// Call site or provider name
    pub call_site: String,
    pub reason: FailureKind,
    pub branch: FallbackBranch,
    pub detail: String,
}

impl FallbackRecord {
    pub fn new(
        phase: Phase,
        call_site: impl Into<String>,
        reason: FailureKind,
        branch: FallbackBranch,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            call_site: call_site.into(),
            reason,
            branch,
            detail: detail.into(),
        }
    }
}

/// Token usage accumulated over a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmUsage {
    pub calls: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmUsage {
    pub fn record(&mut self, input_tokens: u32, output_tokens: u32) {
        self.calls += 1;
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
    }

    pub fn merge(&mut self, other: LlmUsage) {
        self.calls += other.calls;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// The mutable record of a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub transaction: Transaction,
    pub behavior: CustomerBehavior,
    pub started_at: DateTime<Utc>,

    signals: Option<DerivedSignals>,
    policy_matches: Option<PolicyMatchResult>,
    threat_intel: Option<ThreatIntelResult>,
    evidence: Option<AggregatedEvidence>,
    debate: Option<DebateArguments>,
    decision: Option<FraudDecision>,
    explanation: Option<ExplanationResult>,

    fallbacks: Vec<FallbackRecord>,
    usage: LlmUsage,

    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

fn write_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<(), StateError> {
    if slot.is_some() {
        return Err(StateError::AlreadyWritten { field });
    }
    *slot = Some(value);
    Ok(())
}

fn require<'a, T>(
    slot: &'a Option<T>,
    field: &'static str,
    phase: Phase,
) -> Result<&'a T, StateError> {
    slot.as_ref().ok_or(StateError::Missing { field, phase })
}

impl OrchestratorState {
    pub fn new(transaction: Transaction, behavior: CustomerBehavior) -> Self {
        Self {
            transaction,
            behavior,
            started_at: Utc::now(),
            signals: None,
            policy_matches: None,
            threat_intel: None,
            evidence: None,
            debate: None,
            decision: None,
            explanation: None,
            fallbacks: Vec::new(),
            usage: LlmUsage::default(),
            completed_at: None,
        }
    }

    pub fn set_signals(&mut self, value: DerivedSignals) -> Result<(), StateError> {
        write_once(&mut self.signals, value, "signals")
    }

    pub fn set_policy_matches(&mut self, value: PolicyMatchResult) -> Result<(), StateError> {
        write_once(&mut self.policy_matches, value, "policy_matches")
    }

    pub fn set_threat_intel(&mut self, value: ThreatIntelResult) -> Result<(), StateError> {
        write_once(&mut self.threat_intel, value, "threat_intel")
    }

    pub fn set_evidence(&mut self, value: AggregatedEvidence) -> Result<(), StateError> {
        write_once(&mut self.evidence, value, "evidence")
    }

    pub fn set_debate(&mut self, value: DebateArguments) -> Result<(), StateError> {
        write_once(&mut self.debate, value, "debate")
    }

    pub fn set_decision(&mut self, value: FraudDecision) -> Result<(), StateError> {
        write_once(&mut self.decision, value, "decision")
    }

    pub fn set_explanation(&mut self, value: ExplanationResult) -> Result<(), StateError> {
        write_once(&mut self.explanation, value, "explanation")?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Read a field needed by `phase`.
    pub fn signals(&self, phase: Phase) -> Result<&DerivedSignals, StateError> {
        require(&self.signals, "signals", phase)
    }

    pub fn policy_matches(&self, phase: Phase) -> Result<&PolicyMatchResult, StateError> {
        require(&self.policy_matches, "policy_matches", phase)
    }

    pub fn threat_intel(&self, phase: Phase) -> Result<&ThreatIntelResult, StateError> {
        require(&self.threat_intel, "threat_intel", phase)
    }

    pub fn evidence(&self, phase: Phase) -> Result<&AggregatedEvidence, StateError> {
        require(&self.evidence, "evidence", phase)
    }

    pub fn debate(&self, phase: Phase) -> Result<&DebateArguments, StateError> {
        require(&self.debate, "debate", phase)
    }

    pub fn decision(&self, phase: Phase) -> Result<&FraudDecision, StateError> {
        require(&self.decision, "decision", phase)
    }

    pub fn explanation(&self, phase: Phase) -> Result<&ExplanationResult, StateError> {
        require(&self.explanation, "explanation", phase)
    }

    pub fn record_fallback(&mut self, record: FallbackRecord) {
        self.fallbacks.push(record);
    }

    pub fn fallbacks(&self) -> &[FallbackRecord] {
        &self.fallbacks
    }

    pub fn record_usage(&mut self, usage: LlmUsage) {
        self.usage.merge(usage);
    }

    pub fn usage(&self) -> LlmUsage {
        self.usage
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BehavioralSignals, HourRange, TransactionSignals};

    fn state() -> OrchestratorState {
        let transaction = serde_json::from_value(serde_json::json!({
            "id": "tx-1",
            "customer_id": "c-1",
            "amount": 10.0,
            "currency": "USD",
            "country": "US",
            "channel": "pos",
            "device_id": "d-1",
            "timestamp": "2025-01-01T12:00:00Z",
            "merchant_id": "m-1"
        }))
        .unwrap();
        let behavior = CustomerBehavior {
            customer_id: "c-1".to_string(),
            average_amount: 10.0,
            usual_hours: HourRange::default(),
            usual_countries: vec!["US".to_string()],
            usual_devices: vec!["d-1".to_string()],
        };
        OrchestratorState::new(transaction, behavior)
    }

    fn signals() -> DerivedSignals {
        DerivedSignals {
            transaction: TransactionSignals {
                amount_ratio: 1.0,
                off_hours: false,
                foreign: false,
                unknown_device: false,
            },
            behavioral: BehavioralSignals {
                deviation_score: 0.0,
                anomalies: Vec::new(),
            },
        }
    }

    #[test]
    fn test_second_write_is_rejected() {
        let mut state = state();
        state.set_signals(signals()).unwrap();
        assert_eq!(
            state.set_signals(signals()),
            Err(StateError::AlreadyWritten { field: "signals" })
        );
    }

    #[test]
    fn test_missing_field_names_phase() {
        let state = state();
        assert_eq!(
            state.evidence(Phase::Debate).unwrap_err(),
            StateError::Missing {
                field: "evidence",
                phase: Phase::Debate
            }
        );
    }

    #[test]
    fn test_usage_accumulates() {
        let mut state = state();
        let mut usage = LlmUsage::default();
        usage.record(100, 20);
        usage.record(50, 10);
        state.record_usage(usage);
        assert_eq!(state.usage().calls, 2);
        assert_eq!(state.usage().input_tokens, 150);
    }

    #[test]
    fn test_phases_are_ordered() {
        assert!(Phase::Context < Phase::Evidence);
        assert!(Phase::Decision < Phase::Explanation);
    }
}
