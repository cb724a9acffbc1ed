//! Core types shared by every phase of a fraud evaluation.
//!
//! Inputs (`Transaction`, `CustomerBehavior`) are immutable. Every phase
//! output is produced once and only read afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A payment to be scored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub customer_id: String,
    pub amount: f64,
    pub currency: String,
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    pub channel: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub merchant_id: String,
}

/// Inclusive range of hours (UTC) in which a customer usually transacts.
///
/// `start > end` describes a range that wraps midnight, e.g. `22..=6`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HourRange {
    pub start: u32,
    pub end: u32,
}

impl HourRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour <= self.end
        } else {
            hour >= self.start || hour <= self.end
        }
    }
}

impl Default for HourRange {
    fn default() -> Self {
        Self { start: 7, end: 22 }
    }
}

/// Historical profile of a customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerBehavior {
    pub customer_id: String,
    pub average_amount: f64,
    #[serde(default)]
    pub usual_hours: HourRange,
    #[serde(default)]
    pub usual_countries: Vec<String>,
    #[serde(default)]
    pub usual_devices: Vec<String>,
}

/// Per-transaction flags derived from the customer profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionSignals {
    /// Amount divided by the customer's historical average
    pub amount_ratio: f64,
    pub off_hours: bool,
    pub foreign: bool,
    pub unknown_device: bool,
}

/// Behavioral deviation summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehavioralSignals {
    /// Deviation from the customer's usual pattern (0.0 - 1.0)
    pub deviation_score: f64,

    /// Human-readable anomalies in detection order
    pub anomalies: Vec<String>,
}

/// Output of the context phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerivedSignals {
    pub transaction: TransactionSignals,
    pub behavioral: BehavioralSignals,
}

/// A policy the transaction appears to fall under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyMatch {
    pub policy_id: String,
    pub justification: String,
    /// Relevance (0.0 - 1.0)
    pub relevance: f64,
}

/// Result of the policy-matching half of the evidence phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyMatchResult {
    pub matches: Vec<PolicyMatch>,

    /// Identifiers of the retrieved chunks, kept for traceability
    pub chunk_ids: Vec<String>,
}

impl PolicyMatchResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn policy_ids(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.policy_id.as_str()).collect()
    }

    /// Highest relevance among matches, if any matched.
    pub fn max_relevance(&self) -> Option<f64> {
        self.matches.iter().map(|m| m.relevance).reduce(f64::max)
    }
}

/// Where a threat-intel source came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    CountryRisk,
    Osint,
    Sanctions,
    Unknown,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::CountryRisk => "country_risk",
            SourceKind::Osint => "osint",
            SourceKind::Sanctions => "sanctions",
            SourceKind::Unknown => "unknown",
        }
    }
}

/// A single signal returned by a threat-intel provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreatSource {
    pub kind: SourceKind,

    /// Origin identifier, e.g. `fatf_high_kp` or `opensanctions_NK-123`
    pub origin: String,

    /// Confidence that this source indicates risk (0.0 - 1.0)
    pub confidence: f64,

    pub description: String,
}

/// Combined output of the provider gatherer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThreatIntelResult {
    pub threat_level: f64,
    pub sources: Vec<ThreatSource>,
}

/// Risk bucket derived from the composite score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 4] = [
        RiskCategory::Low,
        RiskCategory::Medium,
        RiskCategory::High,
        RiskCategory::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "low",
            RiskCategory::Medium => "medium",
            RiskCategory::High => "high",
            RiskCategory::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized per-source contributions to the composite score.
///
/// `None` means the source reported nothing (no policy matched, no provider
/// returned a source), which is different from reporting zero risk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskComponents {
    pub policy: Option<f64>,
    pub behavioral: f64,
    pub threat: Option<f64>,
}

impl RiskComponents {
    /// Values of the sources that actually reported.
    pub fn reported(&self) -> Vec<f64> {
        let mut values = Vec::with_capacity(3);
        if let Some(p) = self.policy {
            values.push(p);
        }
        values.push(self.behavioral);
        if let Some(t) = self.threat {
            values.push(t);
        }
        values
    }
}

/// Evidence merged from every source. Immutable once computed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedEvidence {
    /// Composite risk (0.0 - 100.0)
    pub composite_risk_score: f64,
    pub risk_category: RiskCategory,
    pub all_signals: Vec<String>,
    pub all_citations: Vec<String>,
    pub components: RiskComponents,
}

/// Which side of the debate an evaluator argues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    ProFraud,
    ProCustomer,
}

impl Stance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stance::ProFraud => "pro_fraud",
            Stance::ProCustomer => "pro_customer",
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an argument came from the model or the deterministic fallback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentOrigin {
    Model,
    Fallback,
}

/// One half of the debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Argument {
    pub text: String,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Between 2 and 5 evidence citations
    pub citations: Vec<String>,
    pub origin: ArgumentOrigin,
}

/// The pro-fraud half, written only by the pro-fraud evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct ProFraudHalf(pub Argument);

/// The pro-customer half, written only by the pro-customer evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct ProCustomerHalf(pub Argument);

/// Both halves of the debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateArguments {
    pub pro_fraud: Argument,
    pub pro_customer: Argument,
}

impl DebateArguments {
    /// Combine the two independently produced halves.
    ///
    /// Each half can only come from its own evaluator, so the merge is a
    /// structural combination with nothing to reconcile.
    pub fn join(pro_fraud: ProFraudHalf, pro_customer: ProCustomerHalf) -> Self {
        Self {
            pro_fraud: pro_fraud.0,
            pro_customer: pro_customer.0,
        }
    }

    /// Pro-fraud minus pro-customer confidence (-1.0 - 1.0).
    pub fn lean(&self) -> f64 {
        self.pro_fraud.confidence - self.pro_customer.confidence
    }
}

/// Final decision outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    Challenge,
    Block,
    EscalateToHuman,
}

impl Decision {
    pub const ALL: [Decision; 4] = [
        Decision::Approve,
        Decision::Challenge,
        Decision::Block,
        Decision::EscalateToHuman,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Challenge => "CHALLENGE",
            Decision::Block => "BLOCK",
            Decision::EscalateToHuman => "ESCALATE_TO_HUMAN",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the arbiter deferred to a person.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscalationReason {
    /// Arbiter confidence fell below the operational threshold
    LowConfidence { confidence: f64, threshold: f64 },

    /// Both evaluators argued their side with high confidence
    IrreconcilableDebate { pro_fraud: f64, pro_customer: f64 },

    /// Neither side won the debate on a category it was meant to settle
    BalancedDebate { pro_fraud: f64, pro_customer: f64 },

    /// Reported evidence sources point in opposite directions
    ConflictingEvidence { highest: f64, lowest: f64 },
}

/// The arbiter's decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudDecision {
    pub transaction_id: String,
    pub decision: Decision,
    /// Arbiter confidence (0.0 - 1.0)
    pub confidence: f64,
    pub key_signals: Vec<String>,

    /// Decision before any escalation override
    pub raw_decision: Decision,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,

    pub decided_at: DateTime<Utc>,
}

/// Which rung of the fallback ladder produced an explanation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationLevel {
    Model,
    Template,
    Minimal,
}

/// Customer- and audit-facing explanations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplanationResult {
    pub customer_explanation: String,
    pub audit_explanation: String,

    /// Advisory only
    #[serde(default)]
    pub key_factors: Vec<String>,

    /// Advisory only
    #[serde(default)]
    pub recommended_actions: Vec<String>,

    pub level: ExplanationLevel,
}

/// A chunk returned by the policy index, before scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub distance: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RetrievedChunk {
    /// The policy this chunk belongs to (`policy_id` metadata, else the chunk id).
    pub fn policy_id(&self) -> &str {
        self.metadata
            .get("policy_id")
            .map(String::as_str)
            .unwrap_or(&self.id)
    }
}
