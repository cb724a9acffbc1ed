//! Explanation post-processing and fallbacks.
//!
//! A model-written bundle goes through the sanitizer (customer text) and the
//! completeness checker (audit text). When the model produced nothing usable
//! the deterministic template is used, and if even that path fails the
//! minimal explanation is returned.

pub mod audit;
pub mod sanitizer;
pub mod templates;

pub use audit::ensure_complete;
pub use sanitizer::{sanitize, Sanitized};
pub use templates::{minimal_explanation, template_explanation};

use crate::config::ExplanationConfig;
use crate::parser::ParsedExplanation;
use crate::types::{
    AggregatedEvidence, DebateArguments, Decision, EscalationReason, ExplanationLevel,
    ExplanationResult, FraudDecision, PolicyMatchResult, RiskCategory,
};

/// Everything an explanation may refer to, detached from the run state.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplanationFacts {
    pub transaction_id: String,
    pub decision: Decision,
    pub confidence: f64,
    pub risk_score: f64,
    pub risk_category: RiskCategory,
    pub policy_ids: Vec<String>,
    pub key_signals: Vec<String>,
    pub escalation_reason: Option<EscalationReason>,
    pub pro_fraud_confidence: f64,
    pub pro_customer_confidence: f64,
}

impl ExplanationFacts {
    pub fn new(
        decision: &FraudDecision,
        evidence: &AggregatedEvidence,
        debate: &DebateArguments,
        policy: &PolicyMatchResult,
    ) -> Self {
        Self {
            transaction_id: decision.transaction_id.clone(),
            decision: decision.decision,
            confidence: decision.confidence,
            risk_score: evidence.composite_risk_score,
            risk_category: evidence.risk_category,
            policy_ids: policy.policy_ids().into_iter().map(String::from).collect(),
            key_signals: decision.key_signals.clone(),
            escalation_reason: decision.escalation_reason.clone(),
            pro_fraud_confidence: debate.pro_fraud.confidence,
            pro_customer_confidence: debate.pro_customer.confidence,
        }
    }
}

/// Apply the customer sanitizer and audit checker to a model bundle.
///
/// The two halves are handled independently: a replaced customer text does
/// not affect the audit text, and vice versa.
pub fn finalize(
    parsed: ParsedExplanation,
    facts: &ExplanationFacts,
    config: &ExplanationConfig,
) -> (ExplanationResult, Sanitized) {
    let sanitized = sanitize(
        &parsed.customer,
        &config.denylist,
        config.templates.for_decision(facts.decision),
    );

    let audit = if parsed.audit.trim().is_empty() {
        templates::audit_record(facts)
    } else {
        ensure_complete(&parsed.audit, facts)
    };

    let key_factors = if parsed.key_factors.is_empty() {
        facts.key_signals.clone()
    } else {
        parsed.key_factors
    };
    let recommended_actions = if parsed.recommended_actions.is_empty() {
        templates::recommended_actions(facts.decision)
    } else {
        parsed.recommended_actions
    };

    let result = ExplanationResult {
        customer_explanation: sanitized.text.clone(),
        audit_explanation: audit,
        key_factors,
        recommended_actions,
        level: ExplanationLevel::Model,
    };
    (result, sanitized)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn facts(decision: Decision, policy_ids: &[&str]) -> ExplanationFacts {
        ExplanationFacts {
            transaction_id: "tx-42".to_string(),
            decision,
            confidence: 0.7,
            risk_score: 55.0,
            risk_category: RiskCategory::High,
            policy_ids: policy_ids.iter().map(|s| s.to_string()).collect(),
            key_signals: vec!["amount is 17.0x the customer's average".to_string()],
            escalation_reason: None,
            pro_fraud_confidence: 0.75,
            pro_customer_confidence: 0.35,
        }
    }
}
