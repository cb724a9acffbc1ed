//! Audit-explanation completeness checker.
//!
//! Required elements that the text does not already contain are appended in
//! a fixed `label: value` format, so auditors can grep for them. A value only
//! counts as present when it stands alone: `low` inside "below" or `BLOCK`
//! inside "blocked" does not.

use regex::Regex;

use super::ExplanationFacts;

/// Whether `needle` occurs in `text` as a whole token, ignoring case.
fn contains_token(text: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    // A trailing period ends a sentence unless a digit follows it
    let pattern = format!(
        r"(?i)(?:^|[^\w.]){}(?:[^\w.]|\.(?:\D|$)|$)",
        regex::escape(needle)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => text.to_lowercase().contains(&needle.to_lowercase()),
    }
}

/// Required audit lines for `facts`, paired with whether `text` already covers each.
fn required_elements(text: &str, facts: &ExplanationFacts) -> Vec<(String, bool)> {
    let has = |needle: &str| contains_token(text, needle);

    let confidence = format!("{:.2}", facts.confidence);
    let score = format!("{:.1}", facts.risk_score);

    let mut elements = vec![
        (
            format!("transaction id: {}", facts.transaction_id),
            has(&facts.transaction_id),
        ),
        (
            format!("decision: {} (confidence {})", facts.decision, confidence),
            has(facts.decision.as_str()) && has(&confidence),
        ),
        (
            format!("risk score: {} ({} risk)", score, facts.risk_category),
            has(&score) && has(facts.risk_category.as_str()),
        ),
    ];

    let missing_policies: Vec<&str> = facts
        .policy_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !has(id))
        .collect();
    if !facts.policy_ids.is_empty() {
        elements.push((
            format!("policies applied: {}", facts.policy_ids.join(", ")),
            missing_policies.is_empty(),
        ));
    }
    elements
}

/// Append whatever required elements are missing from `text`.
pub fn ensure_complete(text: &str, facts: &ExplanationFacts) -> String {
    let missing: Vec<String> = required_elements(text, facts)
        .into_iter()
        .filter(|(_, present)| !present)
        .map(|(line, _)| line)
        .collect();

    let text = text.trim();
    if missing.is_empty() {
        return text.to_string();
    }

    let mut completed = String::with_capacity(text.len() + 128);
    completed.push_str(text);
    if !completed.is_empty() {
        completed.push_str("\n\n");
    }
    completed.push_str(&missing.join("\n"));
    completed
}

/// Whether every required element is present.
pub fn is_complete(text: &str, facts: &ExplanationFacts) -> bool {
    required_elements(text, facts).iter().all(|(_, present)| *present)
}
