//! Pipeline configuration.
//!
//! One immutable `PipelineConfig` is built at startup and threaded into every
//! component constructor. Nothing reads ambient settings. Every section has a
//! `Default`, so a config file only needs the values it overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::explanation::sanitizer::find_violation;
use crate::types::{Decision, RiskCategory};

/// Score at or above which a transaction is `medium` risk.
pub const MEDIUM_RISK_THRESHOLD: f64 = 25.0;

/// Score at or above which a transaction is `high` risk.
pub const HIGH_RISK_THRESHOLD: f64 = 50.0;

/// Score at or above which a transaction is `critical` risk.
pub const CRITICAL_RISK_THRESHOLD: f64 = 75.0;

/// Default weight of the policy-match contribution.
pub const POLICY_WEIGHT: f64 = 0.25;

/// Default weight of the behavioral contribution.
pub const BEHAVIORAL_WEIGHT: f64 = 0.55;

/// Default weight of the threat-intel contribution.
pub const THREAT_WEIGHT: f64 = 0.20;

/// Distinct matched policies needed for the policy contribution to reach
/// full strength. Fewer matches scale it down proportionally.
pub const POLICY_CORROBORATION: usize = 4;

/// Minimum relevance a retrieved policy must reach to count.
pub const DEFAULT_RELEVANCE_FLOOR: f64 = 0.5;

/// Maximum number of policy matches kept.
pub const DEFAULT_MAX_MATCHES: usize = 5;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for durations written as `"15s"`, `"1m 30s"`, etc.
pub mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Top-level configuration consumed by the pipeline controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub timeouts: TimeoutConfig,
    pub providers: ProviderConfig,
    pub aggregation: AggregationWeights,
    pub thresholds: RiskThresholds,
    pub retrieval: RetrievalConfig,
    pub arbiter: ArbiterConfig,
    pub explanation: ExplanationConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub llm: LlmSettings,
}

impl PipelineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&raw),
            _ => Self::from_yaml(&raw),
        }
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check cross-field invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.aggregation.validate()?;
        self.thresholds.validate()?;
        self.retrieval.validate()?;
        self.arbiter.validate()?;
        self.explanation.validate()?;
        Ok(())
    }
}

/// Per-call deadlines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for each threat-intel provider lookup
    #[serde(with = "duration_human")]
    pub provider: Duration,

    /// Deadline for the policy index search
    #[serde(with = "duration_human")]
    pub retrieval: Duration,

    /// Deadline for the policy-matching model call
    #[serde(with = "duration_human")]
    pub policy_match: Duration,

    /// Deadline for each debate model call
    #[serde(with = "duration_human")]
    pub debate: Duration,

    /// Deadline for the explanation model call
    #[serde(with = "duration_human")]
    pub explanation: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            provider: Duration::from_secs(15),
            retrieval: Duration::from_secs(10),
            policy_match: Duration::from_secs(30),
            debate: Duration::from_secs(30),
            explanation: Duration::from_secs(30),
        }
    }
}

/// Threat-intel provider enablement.
///
/// The local country-risk table is always on and has no flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub osint_enabled: bool,
    pub sanctions_enabled: bool,

    /// Sanctions API key; falls back to `OPENSANCTIONS_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanctions_api_key: Option<String>,

    pub sanctions_endpoint: String,

    /// Minimum match score for a sanctions hit to become a source
    pub sanctions_min_score: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            osint_enabled: false,
            sanctions_enabled: false,
            sanctions_api_key: None,
            sanctions_endpoint: "https://api.opensanctions.org".to_string(),
            sanctions_min_score: 0.7,
        }
    }
}

/// Weights of the composite risk score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggregationWeights {
    pub policy: f64,
    pub behavioral: f64,
    pub threat: f64,

    /// Distinct policies at which the policy contribution saturates
    pub policy_corroboration: usize,
}

impl Default for AggregationWeights {
    fn default() -> Self {
        Self {
            policy: POLICY_WEIGHT,
            behavioral: BEHAVIORAL_WEIGHT,
            threat: THREAT_WEIGHT,
            policy_corroboration: POLICY_CORROBORATION,
        }
    }
}

impl AggregationWeights {
    fn validate(&self) -> Result<(), ConfigError> {
        if [self.policy, self.behavioral, self.threat]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(ConfigError::Invalid(
                "aggregation weights must be finite and non-negative".to_string(),
            ));
        }
        let sum = self.policy + self.behavioral + self.threat;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "aggregation weights must sum to 1.0 (got {:.4})",
                sum
            )));
        }
        if self.policy_corroboration == 0 {
            return Err(ConfigError::Invalid(
                "aggregation.policy_corroboration must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Score thresholds for risk categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: MEDIUM_RISK_THRESHOLD,
            high: HIGH_RISK_THRESHOLD,
            critical: CRITICAL_RISK_THRESHOLD,
        }
    }
}

impl RiskThresholds {
    /// Bucket a composite score.
    pub fn categorize(&self, score: f64) -> RiskCategory {
        if score < self.medium {
            RiskCategory::Low
        } else if score < self.high {
            RiskCategory::Medium
        } else if score < self.critical {
            RiskCategory::High
        } else {
            RiskCategory::Critical
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ordered = 0.0 <= self.medium
            && self.medium < self.high
            && self.high < self.critical
            && self.critical <= 100.0;
        if !ordered {
            return Err(ConfigError::Invalid(format!(
                "risk thresholds must satisfy 0 <= medium < high < critical <= 100 (got {}, {}, {})",
                self.medium, self.high, self.critical
            )));
        }
        Ok(())
    }
}

/// Policy retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub relevance_floor: f64,
    pub max_matches: usize,

    /// Number of neighbours requested from the index
    pub search_k: usize,

    pub cache_capacity: u64,

    #[serde(with = "duration_human")]
    pub cache_ttl: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            relevance_floor: DEFAULT_RELEVANCE_FLOOR,
            max_matches: DEFAULT_MAX_MATCHES,
            search_k: 10,
            cache_capacity: 1_000,
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.relevance_floor) {
            return Err(ConfigError::Invalid(
                "retrieval.relevance_floor must be within [0, 1]".to_string(),
            ));
        }
        if self.max_matches == 0 || self.search_k == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.max_matches and retrieval.search_k must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decision arbiter tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Below this arbiter confidence the decision becomes ESCALATE_TO_HUMAN
    pub min_confidence: f64,

    /// Debate lean (pro-fraud minus pro-customer) needed to BLOCK a high-risk transaction
    pub block_min_lean: f64,

    /// Debate lean toward the customer needed to APPROVE a low-risk transaction
    pub approve_min_lean: f64,

    /// Both debaters at or above this confidence means the debate is irreconcilable
    pub irreconcilable_confidence: f64,

    /// Debaters closer than this are balanced; outside medium risk that escalates
    pub balance_margin: f64,

    /// A reported source at or above this value argues for risk
    pub evidence_risk_floor: f64,

    /// A reported source below this value argues against risk
    pub evidence_benign_ceiling: f64,

    /// Multiplier applied to arbiter confidence when evidence conflicts
    pub conflict_penalty: f64,

    /// Maximum number of key signals attached to a decision
    pub max_key_signals: usize,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            block_min_lean: 0.25,
            approve_min_lean: 0.25,
            irreconcilable_confidence: 0.70,
            balance_margin: 0.10,
            evidence_risk_floor: 0.5,
            evidence_benign_ceiling: 0.25,
            conflict_penalty: 0.5,
            max_key_signals: 6,
        }
    }
}

impl ArbiterConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        if !unit(self.min_confidence)
            || !unit(self.irreconcilable_confidence)
            || !unit(self.balance_margin)
            || !unit(self.conflict_penalty)
            || !unit(self.evidence_risk_floor)
            || !unit(self.evidence_benign_ceiling)
        {
            return Err(ConfigError::Invalid(
                "arbiter confidences, margins and evidence bounds must be within [0, 1]"
                    .to_string(),
            ));
        }
        if self.evidence_benign_ceiling > self.evidence_risk_floor {
            return Err(ConfigError::Invalid(
                "arbiter.evidence_benign_ceiling must not exceed evidence_risk_floor".to_string(),
            ));
        }
        Ok(())
    }
}

/// Customer-explanation safety settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplanationConfig {
    /// Terms that must never reach a customer (case-insensitive)
    pub denylist: Vec<String>,

    pub templates: SafeTemplates,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            denylist: [
                "score",
                "confidence",
                "threshold",
                "policy",
                "model",
                "algorithm",
                "agent",
                "llm",
                "risk category",
                "composite",
                "fatf",
                "osint",
                "debate",
                "classifier",
                "probability",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            templates: SafeTemplates::default(),
        }
    }
}

impl ExplanationConfig {
    /// Every safe template must itself pass the customer sanitizer, or the
    /// fallback path would show a denylisted term.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for decision in Decision::ALL {
            let template = self.templates.for_decision(decision);
            if template.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "explanation.templates for {} is empty",
                    decision
                )));
            }
            if let Some(violation) = find_violation(template, &self.denylist) {
                return Err(ConfigError::Invalid(format!(
                    "explanation.templates for {} contains {}",
                    decision, violation
                )));
            }
        }
        Ok(())
    }
}

/// Pre-approved customer text, one per decision outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafeTemplates {
    pub approve: String,
    pub challenge: String,
    pub block: String,
    pub escalate: String,
}

impl Default for SafeTemplates {
    fn default() -> Self {
        Self {
            approve: "Your transaction has been approved. Thank you for your purchase.".to_string(),
            challenge: "For your protection, we need to confirm this transaction is yours. \
                        Please complete the verification step we have sent you."
                .to_string(),
            block: "We declined this transaction to help protect your account. \
                    If you made this purchase, please contact us and we will help you right away."
                .to_string(),
            escalate: "Your transaction is being reviewed by our team. \
                       We will contact you shortly if we need anything further."
                .to_string(),
        }
    }
}

impl SafeTemplates {
    pub fn for_decision(&self, decision: Decision) -> &str {
        match decision {
            Decision::Approve => &self.approve,
            Decision::Challenge => &self.challenge,
            Decision::Block => &self.block,
            Decision::EscalateToHuman => &self.escalate,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures before opening circuit
    pub failure_threshold: u32,

    /// Time before attempting recovery
    #[serde(with = "duration_human")]
    pub recovery_timeout: Duration,

    /// Successes needed to close circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Settings for model calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub max_tokens: u32,
    /// 0.0 for deterministic
    pub temperature: f32,
    /// Retries on transient provider errors, within the call deadline
    pub max_retries: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 800,
            temperature: 0.0,
            max_retries: 2,
        }
    }
}
