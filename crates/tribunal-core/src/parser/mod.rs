//! Two-stage decoding of model responses.
//!
//! Stage 1 decodes the expected JSON shape, tolerating prose or code fences
//! around it. Stage 2 runs only when stage 1 fails and pattern-matches the
//! free text. When both fail the caller gets a `ParseFailure` and falls back.
//! Numeric fields are clamped to `[0, 1]` in both stages.

pub mod argument;
pub mod explanation;
pub mod policy;
pub mod threat;

pub use argument::{parse_argument, ParsedArgument};
pub use explanation::{parse_explanation, ParsedExplanation};
pub use policy::parse_policy_matches;
pub use threat::parse_threat_sources;

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from decoding a model response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("Response was empty")]
    Empty,

    #[error("Response did not contain a recognisable {expected}")]
    Unrecognized { expected: &'static str },
}

/// Clamp to `[0, 1]`; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Try to decode `T` from the outermost JSON object or array in `raw`.
pub(crate) fn decode_embedded<T: DeserializeOwned>(raw: &str) -> Option<T> {
    embedded_json(raw, '{', '}')
        .and_then(|s| serde_json::from_str(s).ok())
        .or_else(|| embedded_json(raw, '[', ']').and_then(|s| serde_json::from_str(s).ok()))
}

fn embedded_json(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let end = raw.rfind(close)?;
    (end > start).then(|| &raw[start..=end])
}

pub(crate) fn ensure_not_empty(raw: &str) -> Result<(), ParseFailure> {
    if raw.trim().is_empty() {
        Err(ParseFailure::Empty)
    } else {
        Ok(())
    }
}

/// Parse a number that may carry a trailing `%`.
pub(crate) fn parse_fraction(number: &str, percent: bool) -> Option<f64> {
    let value: f64 = number.parse().ok()?;
    Some(clamp_unit(if percent { value / 100.0 } else { value }))
}
