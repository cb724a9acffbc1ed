//! OSINT indicator responses.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use super::{decode_embedded, ensure_not_empty, parse_fraction, ParseFailure};
use crate::threat::OSINT_PREFIX;
use crate::types::ThreatSource;

lazy_static! {
    static ref INDICATOR_LINE: Regex = Regex::new(
        r"(?i)^\s*(?:[-*\u{2022}]|\d+[.)])?\s*(.+?)[\s,;:(\[-]*confidence\s*(?:of|is|=|:)?\s*(\d+(?:\.\d+)?)\s*(%)?"
    )
    .unwrap();
}

#[derive(Deserialize)]
struct IndicatorEntry {
    #[serde(default, alias = "origin", alias = "source")]
    id: Option<String>,
    #[serde(alias = "indicator", alias = "summary")]
    description: String,
    confidence: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndicatorEnvelope {
    Wrapped {
        #[serde(alias = "sources", alias = "findings")]
        indicators: Vec<IndicatorEntry>,
    },
    Bare(Vec<IndicatorEntry>),
}

/// Decode OSINT risk indicators into threat sources.
///
/// Origins are namespaced with the OSINT prefix; entries without an id are
/// numbered in response order.
pub fn parse_threat_sources(raw: &str) -> Result<Vec<ThreatSource>, ParseFailure> {
    ensure_not_empty(raw)?;

    if let Some(envelope) = decode_embedded::<IndicatorEnvelope>(raw) {
        let entries = match envelope {
            IndicatorEnvelope::Wrapped { indicators } => indicators,
            IndicatorEnvelope::Bare(entries) => entries,
        };
        return Ok(entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                ThreatSource::new(
                    osint_origin(entry.id.as_deref(), i),
                    entry.confidence,
                    entry.description.trim(),
                )
            })
            .collect());
    }

    let sources: Vec<ThreatSource> = raw
        .lines()
        .filter_map(|line| INDICATOR_LINE.captures(line))
        .enumerate()
        .filter_map(|(i, caps)| {
            let confidence = parse_fraction(&caps[2], caps.get(3).is_some())?;
            Some(ThreatSource::new(osint_origin(None, i), confidence, caps[1].trim()))
        })
        .collect();

    if sources.is_empty() {
        Err(ParseFailure::Unrecognized {
            expected: "OSINT indicator list",
        })
    } else {
        Ok(sources)
    }
}

fn osint_origin(id: Option<&str>, index: usize) -> String {
    match id.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) if id.starts_with(OSINT_PREFIX) => id.to_string(),
        Some(id) => format!("{}{}", OSINT_PREFIX, id),
        None => format!("{}{}", OSINT_PREFIX, index + 1),
    }
}
