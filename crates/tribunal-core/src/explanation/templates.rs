//! Deterministic explanations used when the model path is unavailable.

use super::ExplanationFacts;
use crate::config::SafeTemplates;
use crate::types::{
    Decision, EscalationReason, ExplanationLevel, ExplanationResult, RiskCategory,
};

/// Operational next steps for a decision.
pub fn recommended_actions(decision: Decision) -> Vec<String> {
    let actions: &[&str] = match decision {
        Decision::Approve => &["no action required"],
        Decision::Challenge => &[
            "send step-up verification to the customer",
            "release the transaction once verification succeeds",
        ],
        Decision::Block => &[
            "notify the customer through a verified channel",
            "review the account for related activity",
        ],
        Decision::EscalateToHuman => &[
            "assign to a fraud analyst for manual review",
            "hold the transaction until reviewed",
        ],
    };
    actions.iter().map(|a| a.to_string()).collect()
}

fn escalation_line(reason: &EscalationReason) -> String {
    match reason {
        EscalationReason::LowConfidence {
            confidence,
            threshold,
        } => format!(
            "escalation: arbiter confidence {:.2} below threshold {:.2}",
            confidence, threshold
        ),
        EscalationReason::IrreconcilableDebate {
            pro_fraud,
            pro_customer,
        } => format!(
            "escalation: irreconcilable debate (pro-fraud {:.2}, pro-customer {:.2})",
            pro_fraud, pro_customer
        ),
        EscalationReason::BalancedDebate {
            pro_fraud,
            pro_customer,
        } => format!(
            "escalation: balanced debate (pro-fraud {:.2}, pro-customer {:.2})",
            pro_fraud, pro_customer
        ),
        EscalationReason::ConflictingEvidence { highest, lowest } => format!(
            "escalation: conflicting evidence (strongest source {:.2}, weakest {:.2})",
            highest, lowest
        ),
    }
}

/// Full audit record built from facts alone.
pub fn audit_record(facts: &ExplanationFacts) -> String {
    let mut lines = vec![
        format!("transaction id: {}", facts.transaction_id),
        format!(
            "decision: {} (confidence {:.2})",
            facts.decision, facts.confidence
        ),
        format!(
            "risk score: {:.1} ({} risk)",
            facts.risk_score, facts.risk_category
        ),
        format!(
            "debate: pro-fraud {:.2}, pro-customer {:.2}",
            facts.pro_fraud_confidence, facts.pro_customer_confidence
        ),
    ];
    if !facts.policy_ids.is_empty() {
        lines.push(format!("policies applied: {}", facts.policy_ids.join(", ")));
    }
    if let Some(reason) = &facts.escalation_reason {
        lines.push(escalation_line(reason));
    }
    if !facts.key_signals.is_empty() {
        lines.push(format!("key signals: {}", facts.key_signals.join("; ")));
    }
    lines.join("\n")
}

/// Second rung: safe customer template plus a complete audit record.
pub fn template_explanation(
    facts: &ExplanationFacts,
    templates: &SafeTemplates,
) -> ExplanationResult {
    ExplanationResult {
        customer_explanation: templates.for_decision(facts.decision).to_string(),
        audit_explanation: audit_record(facts),
        key_factors: facts.key_signals.clone(),
        recommended_actions: recommended_actions(facts.decision),
        level: ExplanationLevel::Template,
    }
}

/// Last rung: needs nothing that could have failed.
pub fn minimal_explanation(
    transaction_id: &str,
    decision: Decision,
    category: RiskCategory,
    templates: &SafeTemplates,
) -> ExplanationResult {
    ExplanationResult {
        customer_explanation: templates.for_decision(decision).to_string(),
        audit_explanation: format!(
            "transaction id: {}\ndecision: {}\nrisk category: {}\n\
             note: explanation generation failed; minimal record",
            transaction_id, decision, category
        ),
        key_factors: Vec::new(),
        recommended_actions: Vec::new(),
        level: ExplanationLevel::Minimal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explanation::audit::is_complete;
    use crate::explanation::test_support::facts;

    #[test]
    fn test_template_audit_is_complete() {
        for decision in Decision::ALL {
            let facts = facts(decision, &["POL-GEO-002"]);
            let result = template_explanation(&facts, &SafeTemplates::default());
            assert!(is_complete(&result.audit_explanation, &facts));
            assert_eq!(result.level, ExplanationLevel::Template);
        }
    }

    #[test]
    fn test_escalation_reason_in_record() {
        let mut facts = facts(Decision::EscalateToHuman, &[]);
        facts.escalation_reason = Some(EscalationReason::ConflictingEvidence {
            highest: 0.55,
            lowest: 0.1,
        });
        assert!(audit_record(&facts).contains("conflicting evidence"));
    }

    #[test]
    fn test_minimal_carries_required_fields() {
        let result = minimal_explanation(
            "tx-9",
            Decision::Block,
            RiskCategory::Critical,
            &SafeTemplates::default(),
        );
        assert!(result.audit_explanation.contains("tx-9"));
        assert!(result.audit_explanation.contains("BLOCK"));
        assert!(result.audit_explanation.contains("critical"));
        assert_eq!(result.level, ExplanationLevel::Minimal);
    }
}
