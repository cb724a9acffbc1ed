//! Debate-argument responses.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use super::{clamp_unit, decode_embedded, ensure_not_empty, parse_fraction, ParseFailure};

lazy_static! {
    static ref CONFIDENCE: Regex =
        Regex::new(r"(?i)confidence\s*(?:level|score)?\s*(?:of|is|=|:)?\s*(\d+(?:\.\d+)?)\s*(%)?")
            .unwrap();
    static ref BULLET: Regex = Regex::new(r"^\s*(?:[-*\u{2022}]|\d+[.)])\s+(.+)$").unwrap();
}

/// An argument as decoded from a model response, before citation normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArgument {
    pub text: String,
    pub confidence: f64,
    pub citations: Vec<String>,
}

#[derive(Deserialize)]
struct ArgumentPayload {
    #[serde(alias = "text", alias = "reasoning", alias = "position")]
    argument: String,
    confidence: f64,
    #[serde(default, alias = "evidence", alias = "evidence_citations")]
    citations: Vec<String>,
}

/// Decode one side of the debate.
pub fn parse_argument(raw: &str) -> Result<ParsedArgument, ParseFailure> {
    ensure_not_empty(raw)?;

    if let Some(payload) = decode_embedded::<ArgumentPayload>(raw) {
        if !payload.argument.trim().is_empty() {
            return Ok(ParsedArgument {
                text: payload.argument.trim().to_string(),
                confidence: clamp_unit(payload.confidence),
                citations: clean_citations(payload.citations),
            });
        }
    }

    parse_free_text(raw).ok_or(ParseFailure::Unrecognized {
        expected: "argument with confidence",
    })
}

fn parse_free_text(raw: &str) -> Option<ParsedArgument> {
    let caps = CONFIDENCE.captures(raw)?;
    let confidence = parse_fraction(&caps[1], caps.get(2).is_some())?;

    let mut citations = Vec::new();
    let mut prose = Vec::new();
    for line in raw.lines() {
        if let Some(bullet) = BULLET.captures(line) {
            citations.push(bullet[1].trim().to_string());
        } else if !line.trim().is_empty() && !CONFIDENCE.is_match(line) {
            prose.push(line.trim());
        }
    }

    let text = prose.join(" ");
    if text.is_empty() {
        return None;
    }

    Some(ParsedArgument {
        text,
        confidence,
        citations: clean_citations(citations),
    })
}

fn clean_citations(citations: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(citations.len());
    for citation in citations {
        let citation = citation.trim().to_string();
        if !citation.is_empty() && !cleaned.contains(&citation) {
            cleaned.push(citation);
        }
    }
    cleaned
}
