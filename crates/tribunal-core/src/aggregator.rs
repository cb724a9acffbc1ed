//! Evidence aggregation.
//!
//! Merges the two halves of the evidence phase with the behavioral signals
//! into one composite score. Pure and deterministic.
//!
//! Policies are retrieved from the same anomalies the behavioral score is
//! built from, so a single strong match adds little on its own. The policy
//! component is the best relevance scaled by how many distinct policies
//! corroborate it, saturating at `policy_corroboration`.

use std::collections::HashSet;

use crate::config::{AggregationWeights, RiskThresholds};
use crate::types::{
    AggregatedEvidence, BehavioralSignals, PolicyMatchResult, RiskComponents, ThreatIntelResult,
};

/// Evidence aggregator configured with weights and thresholds.
#[derive(Debug, Clone, Default)]
pub struct EvidenceAggregator {
    weights: AggregationWeights,
    thresholds: RiskThresholds,
}

impl EvidenceAggregator {
    pub fn new(weights: AggregationWeights, thresholds: RiskThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    /// Combine policy matches, behavioral signals and threat intel.
    pub fn aggregate(
        &self,
        policy: &PolicyMatchResult,
        behavioral: &BehavioralSignals,
        threat: &ThreatIntelResult,
    ) -> AggregatedEvidence {
        let components = RiskComponents {
            policy: policy
                .max_relevance()
                .map(|best| (best * self.corroboration(policy)).clamp(0.0, 1.0)),
            behavioral: behavioral.deviation_score.clamp(0.0, 1.0),
            threat: (!threat.sources.is_empty()).then_some(threat.threat_level.clamp(0.0, 1.0)),
        };

        let weighted = self.weights.policy * components.policy.unwrap_or(0.0)
            + self.weights.behavioral * components.behavioral
            + self.weights.threat * components.threat.unwrap_or(0.0);
        let composite_risk_score = 100.0 * weighted.clamp(0.0, 1.0);

        let mut signals = OrderedSet::default();
        let mut citations = OrderedSet::default();

        for m in &policy.matches {
            signals.push(format!("policy {}: {}", m.policy_id, m.justification));
            citations.push(format!("policy {}", m.policy_id));
        }
        for anomaly in &behavioral.anomalies {
            signals.push(anomaly.clone());
            citations.push(anomaly.clone());
        }
        for source in &threat.sources {
            signals.push(format!("{}: {}", source.kind.as_str(), source.description));
            citations.push(source.origin.clone());
        }

        AggregatedEvidence {
            composite_risk_score,
            risk_category: self.thresholds.categorize(composite_risk_score),
            all_signals: signals.into_vec(),
            all_citations: citations.into_vec(),
            components,
        }
    }

    fn corroboration(&self, policy: &PolicyMatchResult) -> f64 {
        let distinct: HashSet<&str> = policy.policy_ids().into_iter().collect();
        let needed = self.weights.policy_corroboration.max(1);
        (distinct.len() as f64 / needed as f64).min(1.0)
    }
}

/// Insertion-ordered, duplicate-free list.
#[derive(Default)]
struct OrderedSet(Vec<String>);

impl OrderedSet {
    fn push(&mut self, item: String) {
        if !self.0.contains(&item) {
            self.0.push(item);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.0
    }
}
