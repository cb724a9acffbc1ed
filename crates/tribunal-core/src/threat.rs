//! Threat-intel baseline and source classification.

use crate::parser::clamp_unit;
use crate::types::{SourceKind, ThreatIntelResult, ThreatSource};

/// Origin prefix of the local country-risk table.
pub const FATF_PREFIX: &str = "fatf_";

/// Origin prefix of OSINT indicators.
pub const OSINT_PREFIX: &str = "osint_";

/// Origin prefix of sanctions-list hits.
pub const SANCTIONS_PREFIX: &str = "opensanctions_";

/// Bonus added per corroborating source beyond the strongest.
pub const CORROBORATION_BONUS: f64 = 0.1;

/// Classify a source by its origin prefix. Used for display and audit only.
pub fn classify_source(origin: &str) -> SourceKind {
    if origin.starts_with(FATF_PREFIX) {
        SourceKind::CountryRisk
    } else if origin.starts_with(OSINT_PREFIX) {
        SourceKind::Osint
    } else if origin.starts_with(SANCTIONS_PREFIX) {
        SourceKind::Sanctions
    } else {
        SourceKind::Unknown
    }
}

/// Baseline threat level: 0 with no sources, otherwise the strongest
/// confidence plus a corroboration bonus per extra source, capped at 1.
pub fn calculate_baseline(confidences: &[f64]) -> f64 {
    let Some(strongest) = confidences.iter().copied().map(clamp_unit).reduce(f64::max) else {
        return 0.0;
    };
    let extra = (confidences.len() - 1) as f64;
    (strongest + CORROBORATION_BONUS * extra).min(1.0)
}

impl ThreatSource {
    /// Build a source, classifying it by origin and clamping its confidence.
    pub fn new(origin: impl Into<String>, confidence: f64, description: impl Into<String>) -> Self {
        let origin = origin.into();
        Self {
            kind: classify_source(&origin),
            origin,
            confidence: clamp_unit(confidence),
            description: description.into(),
        }
    }
}

impl ThreatIntelResult {
    /// Combine gathered sources into a result with its baseline level.
    pub fn from_sources(sources: Vec<ThreatSource>) -> Self {
        let confidences: Vec<f64> = sources.iter().map(|s| s.confidence).collect();
        Self {
            threat_level: calculate_baseline(&confidences),
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_baseline_reference_values() {
        assert_eq!(calculate_baseline(&[]), 0.0);
        assert!(approx(calculate_baseline(&[0.42]), 0.42));
        assert!(approx(calculate_baseline(&[0.8, 0.5]), 0.9));
        assert!(approx(calculate_baseline(&[1.0, 0.9, 0.8]), 1.0));
    }

    #[test]
    fn test_classify_by_prefix() {
        assert_eq!(classify_source("fatf_high_kp"), SourceKind::CountryRisk);
        assert_eq!(classify_source("osint_1"), SourceKind::Osint);
        assert_eq!(classify_source("opensanctions_NK-123"), SourceKind::Sanctions);
        assert_eq!(classify_source("internal_list"), SourceKind::Unknown);
    }

    #[test]
    fn test_result_from_sources() {
        let result = ThreatIntelResult::from_sources(vec![
            ThreatSource::new("fatf_high_ir", 0.9, "call for action"),
            ThreatSource::new("osint_1", 0.4, "forum mentions"),
        ]);
        assert!(approx(result.threat_level, 1.0));
        assert_eq!(result.sources[0].kind, SourceKind::CountryRisk);
    }

    proptest! {
        #[test]
        fn prop_baseline_bounded_and_dominates_max(
            confidences in proptest::collection::vec(0.0f64..=1.0, 1..8)
        ) {
            let baseline = calculate_baseline(&confidences);
            let max = confidences.iter().copied().fold(0.0, f64::max);
            prop_assert!(baseline <= 1.0);
            prop_assert!(baseline >= max - 1e-12);
        }
    }
}
