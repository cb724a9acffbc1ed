//! System prompts and user-message rendering for the model-backed agents.
//!
//! Prompts are built from:
//! 1. Base prompt shared by every agent
//! 2. Role prompt for the call site
//! 3. Dynamic content (transaction, evidence) in the user message
//!
//! Every role prompt names the JSON shape its parser expects first.

use tribunal_core::explanation::ExplanationFacts;
use tribunal_core::retrieval::ScoredChunk;
use tribunal_core::{AggregatedEvidence, DerivedSignals, Stance, Transaction};

use crate::generation::CallSite;

/// Base system prompt shared across all agents.
pub const BASE_SYSTEM_PROMPT: &str = r#"
You are one evaluator in a fraud-review tribunal for card and account payments.

## Ground Rules
1. Use ONLY the evidence you are given - do not invent facts about the customer
2. Cite the evidence lines you rely on
3. Confidence is a number between 0.0 and 1.0
4. You have no visibility into other evaluators or their conclusions
5. Respond with the JSON object described below and nothing else
"#;

/// Policy matcher prompt.
pub const POLICY_MATCHER_PROMPT: &str = r#"
## Role: Policy Matcher

You receive a transaction summary and a list of retrieved fraud policies.
Decide which of the listed policies apply to this transaction.
Only use policy ids from the list. An empty list is a valid answer.

## Output Format (JSON)
{
  "matches": [
    {"policy_id": "string", "justification": "why it applies", "relevance": 0.0-1.0}
  ]
}
"#;

/// Pro-fraud advocate prompt.
pub const PRO_FRAUD_PROMPT: &str = r#"
## Role: Pro-Fraud Advocate

Argue that this transaction is fraudulent, as strongly as the evidence honestly allows.
Your confidence is how convincing the case for fraud is, not how much you want it to be.

## Output Format (JSON)
{
  "argument": "one paragraph",
  "confidence": 0.0-1.0,
  "citations": ["2 to 5 evidence lines"]
}
"#;

/// Pro-customer advocate prompt.
pub const PRO_CUSTOMER_PROMPT: &str = r#"
## Role: Pro-Customer Advocate

Argue that this transaction is legitimate customer activity, as strongly as the
evidence honestly allows.
Your confidence is how convincing the case for the customer is.

## Output Format (JSON)
{
  "argument": "one paragraph",
  "confidence": 0.0-1.0,
  "citations": ["2 to 5 evidence lines"]
}
"#;

/// Explanation writer prompt.
pub const EXPLANATION_PROMPT: &str = r#"
## Role: Explanation Writer

Write two explanations of a decision that has already been made.

customer_explanation: plain, reassuring language for the account holder.
Never mention scores, confidence, thresholds, policies, models or internal tooling.

audit_explanation: a precise record for fraud operations. Include the transaction id,
the decision with its confidence, the risk score with its category, and every applied policy id.

## Output Format (JSON)
{
  "customer_explanation": "string",
  "audit_explanation": "string",
  "key_factors": ["string"],
  "recommended_actions": ["string"]
}
"#;

/// OSINT analyst prompt.
pub const OSINT_PROMPT: &str = r#"
## Role: Open-Source Intelligence Analyst

List publicly known risk indicators for the merchant and country below
(fraud reports, scam campaigns, shell-company signs). If you know of none, return an empty list.

## Output Format (JSON)
{
  "indicators": [
    {"id": "short_slug", "description": "string", "confidence": 0.0-1.0}
  ]
}
"#;

/// Role prompt for a call site.
pub fn role_prompt(site: CallSite) -> &'static str {
    match site {
        CallSite::PolicyMatcher => POLICY_MATCHER_PROMPT,
        CallSite::ProFraud => PRO_FRAUD_PROMPT,
        CallSite::ProCustomer => PRO_CUSTOMER_PROMPT,
        CallSite::Explanation => EXPLANATION_PROMPT,
        CallSite::Osint => OSINT_PROMPT,
    }
}

/// Full system prompt for a call site.
pub fn system_prompt(site: CallSite) -> String {
    format!("{}\n{}", BASE_SYSTEM_PROMPT.trim(), role_prompt(site).trim())
}

/// Call site of a debate stance.
pub fn debate_site(stance: Stance) -> CallSite {
    match stance {
        Stance::ProFraud => CallSite::ProFraud,
        Stance::ProCustomer => CallSite::ProCustomer,
    }
}

fn transaction_block(transaction: &Transaction) -> String {
    format!(
        "Transaction {}: {:.2} {} at merchant {} via {} from {} on device {} at {}",
        transaction.id,
        transaction.amount,
        transaction.currency,
        transaction.merchant_id,
        transaction.channel,
        transaction.country,
        transaction.device_id,
        transaction.timestamp.to_rfc3339(),
    )
}

pub fn render_policy_request(
    transaction: &Transaction,
    signals: &DerivedSignals,
    hits: &[ScoredChunk],
) -> String {
    let mut out = transaction_block(transaction);
    out.push_str("\n\nObserved anomalies:\n");
    if signals.behavioral.anomalies.is_empty() {
        out.push_str("- none\n");
    }
    for anomaly in &signals.behavioral.anomalies {
        out.push_str(&format!("- {}\n", anomaly));
    }
    out.push_str("\nRetrieved policies:\n");
    for hit in hits {
        out.push_str(&format!(
            "- {} (retrieval relevance {:.2}): {}\n",
            hit.chunk.policy_id(),
            hit.relevance,
            hit.chunk.text
        ));
    }
    out
}

pub fn render_debate_request(transaction: &Transaction, evidence: &AggregatedEvidence) -> String {
    let mut out = transaction_block(transaction);
    out.push_str(&format!(
        "\n\nComposite risk score: {:.1} ({} risk)\n\nEvidence:\n",
        evidence.composite_risk_score, evidence.risk_category
    ));
    for signal in &evidence.all_signals {
        out.push_str(&format!("- {}\n", signal));
    }
    out
}

pub fn render_explanation_request(facts: &ExplanationFacts) -> String {
    let mut out = format!(
        "Transaction {}\nDecision: {} (confidence {:.2})\nRisk score: {:.1} ({} risk)\n",
        facts.transaction_id,
        facts.decision,
        facts.confidence,
        facts.risk_score,
        facts.risk_category
    );
    if !facts.policy_ids.is_empty() {
        out.push_str(&format!("Applied policies: {}\n", facts.policy_ids.join(", ")));
    }
    out.push_str("Key signals:\n");
    for signal in &facts.key_signals {
        out.push_str(&format!("- {}\n", signal));
    }
    out
}

pub fn render_osint_request(transaction: &Transaction) -> String {
    format!(
        "Merchant: {}\nCountry: {}\nChannel: {}",
        transaction.merchant_id, transaction.country, transaction.channel
    )
}
