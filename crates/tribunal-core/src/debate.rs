//! Debate arguments and their deterministic fallbacks.
//!
//! Each evaluator's outcome is resolved into a well-formed `Argument` by a
//! pure function: a parsed model response is normalised, any failure is
//! replaced by a fallback keyed only by risk category.

use crate::parser::{clamp_unit, ParsedArgument};
use crate::state::FailureKind;
use crate::types::{AggregatedEvidence, Argument, ArgumentOrigin, RiskCategory, Stance};

/// Fewest citations an argument may carry.
pub const MIN_CITATIONS: usize = 2;

/// Most citations an argument may carry.
pub const MAX_CITATIONS: usize = 5;

/// Fallback confidence for a stance at a risk category.
pub fn fallback_confidence(stance: Stance, category: RiskCategory) -> f64 {
    match (stance, category) {
        (Stance::ProFraud, RiskCategory::Critical) => 0.90,
        (Stance::ProFraud, RiskCategory::High) => 0.75,
        (Stance::ProFraud, RiskCategory::Medium) => 0.55,
        (Stance::ProFraud, RiskCategory::Low) => 0.30,
        (Stance::ProCustomer, RiskCategory::Critical) => 0.20,
        (Stance::ProCustomer, RiskCategory::High) => 0.35,
        (Stance::ProCustomer, RiskCategory::Medium) => 0.60,
        (Stance::ProCustomer, RiskCategory::Low) => 0.85,
    }
}

/// Deterministic argument used when the evaluator produced nothing usable.
pub fn fallback_argument(stance: Stance, evidence: &AggregatedEvidence) -> Argument {
    let category = evidence.risk_category;
    let leading: Vec<&str> = evidence.all_signals.iter().take(3).map(String::as_str).collect();
    let observed = if leading.is_empty() {
        "no notable deviations".to_string()
    } else {
        leading.join("; ")
    };

    let text = match stance {
        Stance::ProFraud => format!(
            "Evidence places this transaction at {} risk (composite {:.1}). Observed: {}.",
            category, evidence.composite_risk_score, observed
        ),
        Stance::ProCustomer => format!(
            "At {} risk (composite {:.1}) the observed pattern may still be legitimate \
             customer activity. Observed: {}.",
            category, evidence.composite_risk_score, observed
        ),
    };

    Argument {
        text,
        confidence: fallback_confidence(stance, category),
        citations: normalize_citations(Vec::new(), evidence),
        origin: ArgumentOrigin::Fallback,
    }
}

/// Clamp citations to `MIN_CITATIONS..=MAX_CITATIONS`.
///
/// Short lists are padded from the evidence citations, then the signals, then
/// the category and score themselves.
pub fn normalize_citations(
    mut citations: Vec<String>,
    evidence: &AggregatedEvidence,
) -> Vec<String> {
    citations.retain(|c| !c.trim().is_empty());
    citations.truncate(MAX_CITATIONS);

    let padding = evidence
        .all_citations
        .iter()
        .chain(evidence.all_signals.iter())
        .cloned()
        .chain([
            format!("risk category: {}", evidence.risk_category),
            format!("composite risk score: {:.1}", evidence.composite_risk_score),
        ]);

    for candidate in padding {
        if citations.len() >= MIN_CITATIONS {
            break;
        }
        if !citations.contains(&candidate) {
            citations.push(candidate);
        }
    }
    citations
}

/// Turn an evaluator's outcome into an argument, falling back on any failure.
pub fn resolve_argument(
    stance: Stance,
    outcome: Result<ParsedArgument, FailureKind>,
    evidence: &AggregatedEvidence,
) -> Argument {
    match outcome {
        Ok(parsed) => Argument {
            text: parsed.text,
            confidence: clamp_unit(parsed.confidence),
            citations: normalize_citations(parsed.citations, evidence),
            origin: ArgumentOrigin::Model,
        },
        Err(_) => fallback_argument(stance, evidence),
    }
}
