//! Customer-explanation sanitizer.
//!
//! Replace, don't redact: any hit discards the whole text in favour of the
//! pre-approved template for the decision.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Internal-looking content beyond the configured denylist.
    static ref INTERNAL_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("decimal fraction", Regex::new(r"(?:^|[^\d.,])0?\.\d+").unwrap()),
        ("percentage", Regex::new(r"\d+(?:\.\d+)?\s*%").unwrap()),
        ("identifier", Regex::new(r"\b[A-Z]{2,}(?:[-_][A-Z0-9]+)+\b").unwrap()),
    ];
}

/// Outcome of sanitizing a customer explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    /// What caused the replacement, if the text was replaced
    pub violation: Option<String>,
}

impl Sanitized {
    pub fn was_replaced(&self) -> bool {
        self.violation.is_some()
    }
}

/// First denylisted term or internal pattern found in `text`.
pub fn find_violation(text: &str, denylist: &[String]) -> Option<String> {
    let lowered = text.to_lowercase();
    if let Some(term) = denylist
        .iter()
        .map(|t| t.trim())
        .find(|t| !t.is_empty() && lowered.contains(&t.to_lowercase()))
    {
        return Some(format!("denylisted term '{}'", term));
    }
    INTERNAL_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(name, _)| name.to_string())
}

/// Keep `text` if clean, otherwise return `template` unchanged.
pub fn sanitize(text: &str, denylist: &[String], template: &str) -> Sanitized {
    let trimmed = text.trim();
    let violation = if trimmed.is_empty() {
        Some("empty text".to_string())
    } else {
        find_violation(trimmed, denylist)
    };

    match violation {
        Some(violation) => Sanitized {
            text: template.to_string(),
            violation: Some(violation),
        },
        None => Sanitized {
            text: trimmed.to_string(),
            violation: None,
        },
    }
}
