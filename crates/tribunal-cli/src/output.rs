//! Rendering of pipeline outcomes.

use serde::Serialize;
use tribunal_core::{
    ExplanationResult, FallbackRecord, FraudDecision, LlmUsage, Phase, RiskCategory,
};
use tribunal_runtime::PipelineOutcome;

/// Output format for `score`
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Full report as JSON
    #[default]
    Json,
    /// Short human-readable summary
    Text,
}

#[derive(Serialize)]
struct Report<'a> {
    decision: &'a FraudDecision,
    risk_score: Option<f64>,
    risk_category: Option<RiskCategory>,
    explanation: &'a ExplanationResult,
    fallbacks: &'a [FallbackRecord],
    usage: LlmUsage,
}

pub fn render(outcome: &PipelineOutcome, format: OutputFormat) -> anyhow::Result<String> {
    let evidence = outcome.state.evidence(Phase::Explanation).ok();
    match format {
        OutputFormat::Json => {
            let report = Report {
                decision: &outcome.decision,
                risk_score: evidence.map(|e| e.composite_risk_score),
                risk_category: evidence.map(|e| e.risk_category),
                explanation: &outcome.explanation,
                fallbacks: outcome.state.fallbacks(),
                usage: outcome.state.usage(),
            };
            Ok(serde_json::to_string_pretty(&report)?)
        }
        OutputFormat::Text => {
            let mut out = format!(
                "{}: {} (confidence {:.2})\n",
                outcome.decision.transaction_id,
                outcome.decision.decision,
                outcome.decision.confidence
            );
            if let Some(evidence) = evidence {
                out.push_str(&format!(
                    "risk: {:.1} ({})\n",
                    evidence.composite_risk_score, evidence.risk_category
                ));
            }
            out.push_str(&format!("\ncustomer:\n  {}\n", outcome.explanation.customer_explanation));
            out.push_str("\naudit:\n");
            for line in outcome.explanation.audit_explanation.lines() {
                out.push_str(&format!("  {}\n", line));
            }
            if !outcome.state.fallbacks().is_empty() {
                out.push_str("\nfallbacks:\n");
                for f in outcome.state.fallbacks() {
                    out.push_str(&format!(
                        "  {} {} {} -> {}\n",
                        f.phase, f.call_site, f.reason, f.branch
                    ));
                }
            }
            Ok(out)
        }
    }
}
