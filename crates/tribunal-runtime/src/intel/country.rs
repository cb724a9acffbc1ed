//! Local country-risk table.
//!
//! Tiers follow the FATF public lists: jurisdictions under a call for action,
//! jurisdictions under increased monitoring, and a set of low-risk
//! jurisdictions. Needs no network and no credentials, so it is always on.

use async_trait::async_trait;
use lazy_static::lazy_static;
use std::collections::HashMap;
use tribunal_core::threat::FATF_PREFIX;
use tribunal_core::{ThreatSource, Transaction, TransactionSignals};

use super::{ThreatLookup, ThreatProvider, ThreatProviderError};

/// Confidence reported for a call-for-action jurisdiction.
pub const HIGH_RISK_CONFIDENCE: f64 = 0.90;

/// Confidence reported for a jurisdiction under increased monitoring.
pub const ELEVATED_RISK_CONFIDENCE: f64 = 0.60;

/// Confidence reported for a low-risk jurisdiction the customer does not usually use.
pub const LOW_RISK_CONFIDENCE: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryTier {
    High,
    Elevated,
    Low,
}

impl CountryTier {
    fn label(&self) -> &'static str {
        match self {
            CountryTier::High => "high",
            CountryTier::Elevated => "elevated",
            CountryTier::Low => "low",
        }
    }
}

const HIGH_RISK: &[&str] = &["KP", "IR", "MM"];

const ELEVATED_RISK: &[&str] = &[
    "DZ", "AO", "BG", "BF", "CM", "CD", "HT", "KE", "LA", "LB", "ML", "MC", "MZ", "NA", "NG",
    "ZA", "SS", "SY", "TZ", "VE", "VN", "YE",
];

const LOW_RISK: &[&str] = &[
    "US", "CA", "MX", "GB", "IE", "DE", "FR", "NL", "BE", "LU", "CH", "AT", "ES", "PT", "IT",
    "DK", "SE", "NO", "FI", "IS", "AU", "NZ", "JP", "SG",
];

lazy_static! {
    static ref TIERS: HashMap<&'static str, CountryTier> = {
        let mut tiers = HashMap::new();
        for code in LOW_RISK {
            tiers.insert(*code, CountryTier::Low);
        }
        for code in ELEVATED_RISK {
            tiers.insert(*code, CountryTier::Elevated);
        }
        for code in HIGH_RISK {
            tiers.insert(*code, CountryTier::High);
        }
        tiers
    };
}

/// Threat provider backed by the static country table.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountryRiskProvider;

impl CountryRiskProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn tier(country: &str) -> Option<CountryTier> {
        TIERS.get(country.trim().to_uppercase().as_str()).copied()
    }

    /// The source for `country`, if the table has anything to say.
    pub fn assess(country: &str, foreign: bool) -> Option<ThreatSource> {
        let code = country.trim().to_uppercase();
        let tier = Self::tier(&code)?;
        let (confidence, description) = match tier {
            CountryTier::High => (
                HIGH_RISK_CONFIDENCE,
                format!("{} is a high-risk jurisdiction subject to a call for action", code),
            ),
            CountryTier::Elevated => (
                ELEVATED_RISK_CONFIDENCE,
                format!("{} is a jurisdiction under increased monitoring", code),
            ),
            CountryTier::Low if foreign => (
                LOW_RISK_CONFIDENCE,
                format!("{} is a low-risk jurisdiction new for this customer", code),
            ),
            CountryTier::Low => return None,
        };
        Some(ThreatSource::new(
            format!("{}{}_{}", FATF_PREFIX, tier.label(), code.to_lowercase()),
            confidence,
            description,
        ))
    }
}

#[async_trait]
impl ThreatProvider for CountryRiskProvider {
    fn name(&self) -> &str {
        "country_risk"
    }

    async fn lookup(
        &self,
        transaction: &Transaction,
        signals: &TransactionSignals,
    ) -> Result<ThreatLookup, ThreatProviderError> {
        let sources: Vec<ThreatSource> = Self::assess(&transaction.country, signals.foreign)
            .into_iter()
            .collect();
        Ok(sources.into())
    }
}
