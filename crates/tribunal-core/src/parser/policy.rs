//! Policy-match responses.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use super::{clamp_unit, decode_embedded, ensure_not_empty, ParseFailure};
use crate::types::PolicyMatch;

lazy_static! {
    // <POLICY-ID> ... score|relevance ... <float>
    static ref POLICY_LINE: Regex = Regex::new(
        r"(?m)\b([A-Z][A-Z0-9]*(?:[-_][A-Z0-9]+)+)\b[^\n]*?(?i:score|relevance)\s*(?:of|is|=|:)?\s*(-?\d+(?:\.\d+)?)"
    )
    .unwrap();
}

#[derive(Deserialize)]
struct PolicyEntry {
    #[serde(alias = "id", alias = "policy")]
    policy_id: String,
    #[serde(default, alias = "reason", alias = "rationale")]
    justification: String,
    #[serde(alias = "score", alias = "confidence")]
    relevance: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyEnvelope {
    Wrapped {
        #[serde(alias = "policies", alias = "applicable_policies")]
        matches: Vec<PolicyEntry>,
    },
    Bare(Vec<PolicyEntry>),
}

impl PolicyEntry {
    fn into_match(self) -> PolicyMatch {
        PolicyMatch {
            policy_id: self.policy_id.trim().to_string(),
            justification: self.justification.trim().to_string(),
            relevance: clamp_unit(self.relevance),
        }
    }
}

/// Decode the policies a model judged applicable.
///
/// An explicit empty list is a valid answer.
pub fn parse_policy_matches(raw: &str) -> Result<Vec<PolicyMatch>, ParseFailure> {
    ensure_not_empty(raw)?;

    if let Some(envelope) = decode_embedded::<PolicyEnvelope>(raw) {
        let entries = match envelope {
            PolicyEnvelope::Wrapped { matches } => matches,
            PolicyEnvelope::Bare(entries) => entries,
        };
        return Ok(entries.into_iter().map(PolicyEntry::into_match).collect());
    }

    let matches: Vec<PolicyMatch> = POLICY_LINE
        .captures_iter(raw)
        .filter_map(|caps| {
            let relevance: f64 = caps[2].parse().ok()?;
            let line = caps.get(0)?.as_str();
            Some(PolicyMatch {
                policy_id: caps[1].to_string(),
                justification: line.trim().to_string(),
                relevance: clamp_unit(relevance),
            })
        })
        .collect();

    if matches.is_empty() {
        Err(ParseFailure::Unrecognized {
            expected: "policy match list",
        })
    } else {
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_wrapped() {
        let raw = r#"```json
{"matches": [{"policy_id": "POL-AMT-001", "justification": "large amount", "relevance": 0.8}]}
```"#;
        let matches = parse_policy_matches(raw).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].policy_id, "POL-AMT-001");
        assert_eq!(matches[0].relevance, 0.8);
    }

    #[test]
    fn test_structured_bare_array_with_aliases() {
        let raw = r#"[{"id": "POL-GEO-002", "reason": "new country", "score": 3.5}]"#;
        let matches = parse_policy_matches(raw).unwrap();
        assert_eq!(matches[0].policy_id, "POL-GEO-002");
        assert_eq!(matches[0].justification, "new country");
        assert_eq!(matches[0].relevance, 1.0);
    }

    #[test]
    fn test_structured_empty_list_is_valid() {
        assert!(parse_policy_matches(r#"{"matches": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_pattern_fallback() {
        let raw = "I think POL-AMT-001 applies with relevance: 0.72\n\
                   and POL-DEV-003 has a score of -0.4 because the device is new";
        let matches = parse_policy_matches(raw).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].policy_id, "POL-AMT-001");
        assert!((matches[0].relevance - 0.72).abs() < 1e-9);
        assert_eq!(matches[1].policy_id, "POL-DEV-003");
        assert_eq!(matches[1].relevance, 0.0);
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(
            parse_policy_matches("nothing useful"),
            Err(ParseFailure::Unrecognized {
                expected: "policy match list"
            })
        );
        assert_eq!(parse_policy_matches("   "), Err(ParseFailure::Empty));
    }
}
