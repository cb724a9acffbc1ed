//! Decision arbiter.
//!
//! Turns evidence and the debate into one of four outcomes. The raw decision
//! follows the risk category, with the debate lean deciding the borderline
//! categories. Escalation overrides the raw decision when the debate is
//! irreconcilable, when it is balanced on a category the debate was meant to
//! settle, when the evidence contradicts itself, or when the arbiter's own
//! confidence is below the operational threshold.
//!
//! Medium risk is the exception to the balance rule: a close debate there
//! agrees with the evidence that the transaction is moderate, which is what
//! CHALLENGE is for.

use chrono::Utc;

use crate::config::ArbiterConfig;
use crate::types::{
    AggregatedEvidence, DebateArguments, Decision, EscalationReason, FraudDecision,
    PolicyMatchResult, RiskCategory,
};

/// Decision arbiter.
#[derive(Debug, Clone, Default)]
pub struct DecisionArbiter {
    config: ArbiterConfig,
}

impl DecisionArbiter {
    pub fn new(config: ArbiterConfig) -> Self {
        Self { config }
    }

    pub fn decide(
        &self,
        transaction_id: &str,
        evidence: &AggregatedEvidence,
        debate: &DebateArguments,
        policy: &PolicyMatchResult,
    ) -> FraudDecision {
        let (raw_decision, confidence) = self.raw_decision(evidence.risk_category, debate);

        let (decision, confidence, escalation_reason) =
            match self.escalation(evidence, debate, confidence) {
                Some((reason, adjusted)) => (Decision::EscalateToHuman, adjusted, Some(reason)),
                None => (raw_decision, confidence, None),
            };

        tracing::debug!(
            transaction_id = %transaction_id,
            raw = %raw_decision,
            decision = %decision,
            confidence = confidence,
            lean = debate.lean(),
            "Arbiter decided"
        );

        FraudDecision {
            transaction_id: transaction_id.to_string(),
            decision,
            confidence,
            key_signals: self.key_signals(evidence, policy),
            raw_decision,
            escalation_reason,
            decided_at: Utc::now(),
        }
    }

    fn raw_decision(&self, category: RiskCategory, debate: &DebateArguments) -> (Decision, f64) {
        let lean = debate.lean();
        let decision = match category {
            RiskCategory::Critical => Decision::Block,
            RiskCategory::High if lean >= self.config.block_min_lean => Decision::Block,
            RiskCategory::High | RiskCategory::Medium => Decision::Challenge,
            RiskCategory::Low if -lean >= self.config.approve_min_lean => Decision::Approve,
            RiskCategory::Low => Decision::Challenge,
        };

        let pro_fraud = debate.pro_fraud.confidence;
        let pro_customer = debate.pro_customer.confidence;
        let confidence = match decision {
            Decision::Block => (pro_fraud + (1.0 - pro_customer)) / 2.0,
            Decision::Approve => (pro_customer + (1.0 - pro_fraud)) / 2.0,
            _ => 1.0 - lean.abs(),
        };
        (decision, confidence.clamp(0.0, 1.0))
    }

    fn escalation(
        &self,
        evidence: &AggregatedEvidence,
        debate: &DebateArguments,
        confidence: f64,
    ) -> Option<(EscalationReason, f64)> {
        let pro_fraud = debate.pro_fraud.confidence;
        let pro_customer = debate.pro_customer.confidence;
        if pro_fraud >= self.config.irreconcilable_confidence
            && pro_customer >= self.config.irreconcilable_confidence
        {
            return Some((
                EscalationReason::IrreconcilableDebate {
                    pro_fraud,
                    pro_customer,
                },
                confidence,
            ));
        }

        if evidence.risk_category != RiskCategory::Medium
            && debate.lean().abs() < self.config.balance_margin
        {
            return Some((
                EscalationReason::BalancedDebate {
                    pro_fraud,
                    pro_customer,
                },
                confidence.min(1.0 - self.config.balance_margin),
            ));
        }

        let reported = evidence.components.reported();
        let highest = reported.iter().copied().fold(f64::MIN, f64::max);
        let lowest = reported.iter().copied().fold(f64::MAX, f64::min);
        if reported.len() >= 2
            && highest >= self.config.evidence_risk_floor
            && lowest < self.config.evidence_benign_ceiling
        {
            return Some((
                EscalationReason::ConflictingEvidence { highest, lowest },
                confidence * self.config.conflict_penalty,
            ));
        }

        if confidence < self.config.min_confidence {
            return Some((
                EscalationReason::LowConfidence {
                    confidence,
                    threshold: self.config.min_confidence,
                },
                confidence,
            ));
        }

        None
    }

    fn key_signals(
        &self,
        evidence: &AggregatedEvidence,
        policy: &PolicyMatchResult,
    ) -> Vec<String> {
        let mut signals: Vec<String> = evidence
            .all_signals
            .iter()
            .take(self.config.max_key_signals)
            .cloned()
            .collect();
        for id in policy.policy_ids() {
            if !signals.iter().any(|s| s.contains(id)) {
                signals.push(format!("policy {}", id));
            }
        }
        signals
    }
}
