//! Explanation-bundle responses.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use super::{decode_embedded, ensure_not_empty, ParseFailure};

lazy_static! {
    static ref CUSTOMER_SECTION: Regex = Regex::new(
        r"(?is)customer\s+explanation\s*:\s*(.*?)\s*(?:\n\s*(?:audit\s+explanation|key\s+factors|recommended\s+actions)\s*:|\z)"
    )
    .unwrap();
    static ref AUDIT_SECTION: Regex = Regex::new(
        r"(?is)audit\s+explanation\s*:\s*(.*?)\s*(?:\n\s*(?:customer\s+explanation|key\s+factors|recommended\s+actions)\s*:|\z)"
    )
    .unwrap();
}

/// Both explanations plus advisory lists from one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExplanation {
    pub customer: String,
    pub audit: String,
    pub key_factors: Vec<String>,
    pub recommended_actions: Vec<String>,
}

#[derive(Deserialize)]
struct ExplanationPayload {
    #[serde(alias = "customer")]
    customer_explanation: String,
    #[serde(alias = "audit")]
    audit_explanation: String,
    #[serde(default)]
    key_factors: Vec<String>,
    #[serde(default)]
    recommended_actions: Vec<String>,
}

/// Decode the explanation bundle.
pub fn parse_explanation(raw: &str) -> Result<ParsedExplanation, ParseFailure> {
    ensure_not_empty(raw)?;

    if let Some(payload) = decode_embedded::<ExplanationPayload>(raw) {
        let customer = payload.customer_explanation.trim().to_string();
        let audit = payload.audit_explanation.trim().to_string();
        if !customer.is_empty() && !audit.is_empty() {
            return Ok(ParsedExplanation {
                customer,
                audit,
                key_factors: payload.key_factors,
                recommended_actions: payload.recommended_actions,
            });
        }
    }

    let section = |re: &Regex| {
        re.captures(raw)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty())
    };

    match (section(&CUSTOMER_SECTION), section(&AUDIT_SECTION)) {
        (Some(customer), Some(audit)) => Ok(ParsedExplanation {
            customer,
            audit,
            key_factors: Vec::new(),
            recommended_actions: Vec::new(),
        }),
        _ => Err(ParseFailure::Unrecognized {
            expected: "customer and audit explanations",
        }),
    }
}
