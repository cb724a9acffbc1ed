//! Threat-intel providers and the gatherer that runs them.
//!
//! Every enabled provider runs as its own task under its own deadline. A
//! provider that errors, times out, panics or returns garbage contributes no
//! sources and never holds up the others. A timed-out task is detached, and
//! its result is never observed.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tribunal_core::{
    FailureKind, FallbackBranch, FallbackRecord, LlmUsage, Phase, ThreatIntelResult,
    ThreatSource, Transaction, TransactionSignals,
};

mod country;
mod osint;
mod sanctions;

pub use country::{CountryRiskProvider, CountryTier};
pub use osint::OsintProvider;
pub use sanctions::{SanctionsProvider, OPENSANCTIONS_API_KEY_ENV};

use crate::generation::CallFailure;

/// Errors from a threat-intel provider.
#[derive(Error, Debug)]
pub enum ThreatProviderError {
    #[error("Provider call failed: {0}")]
    Call(#[from] CallFailure),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The model answered but the answer was unusable; its tokens were still spent
    #[error("Malformed model output: {detail}")]
    MalformedGeneration { detail: String, usage: LlmUsage },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ThreatProviderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ThreatProviderError::Call(failure) => failure.kind(),
            ThreatProviderError::Malformed(_)
            | ThreatProviderError::MalformedGeneration { .. } => FailureKind::ParseFailed,
            ThreatProviderError::Request(_) | ThreatProviderError::NotConfigured(_) => {
                FailureKind::Error
            }
        }
    }

    /// Model usage spent before the failure.
    pub fn usage(&self) -> LlmUsage {
        match self {
            ThreatProviderError::MalformedGeneration { usage, .. } => *usage,
            _ => LlmUsage::default(),
        }
    }
}

/// What one provider found, plus any model usage it spent finding it.
#[derive(Debug, Clone, Default)]
pub struct ThreatLookup {
    pub sources: Vec<ThreatSource>,
    pub usage: LlmUsage,
}

impl From<Vec<ThreatSource>> for ThreatLookup {
    fn from(sources: Vec<ThreatSource>) -> Self {
        Self {
            sources,
            usage: LlmUsage::default(),
        }
    }
}

/// A source of threat signals about a transaction.
#[async_trait]
pub trait ThreatProvider: Send + Sync {
    /// Provider name for logging and the fallback trace.
    fn name(&self) -> &str;

    /// Disabled providers are not run.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn lookup(
        &self,
        transaction: &Transaction,
        signals: &TransactionSignals,
    ) -> Result<ThreatLookup, ThreatProviderError>;
}

/// Sources plus the failures that were isolated while gathering them.
#[derive(Debug, Clone, Default)]
pub struct GatherOutcome {
    pub result: ThreatIntelResult,
    pub fallbacks: Vec<FallbackRecord>,
    pub usage: LlmUsage,
}

/// Runs providers concurrently with per-provider isolation.
pub struct ProviderGatherer {
    providers: Vec<Arc<dyn ThreatProvider>>,
    timeout: Duration,
}

impl ProviderGatherer {
    pub fn new(providers: Vec<Arc<dyn ThreatProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    /// Names of the providers that will run.
    pub fn enabled(&self) -> Vec<&str> {
        self.providers
            .iter()
            .filter(|p| p.is_enabled())
            .map(|p| p.name())
            .collect()
    }

    pub async fn gather(
        &self,
        transaction: Arc<Transaction>,
        signals: Arc<TransactionSignals>,
    ) -> GatherOutcome {
        let timeout = self.timeout;
        let lookups = self.providers.iter().filter(|p| p.is_enabled()).map(|provider| {
            let name = provider.name().to_string();
            let provider = Arc::clone(provider);
            let transaction = Arc::clone(&transaction);
            let signals = Arc::clone(&signals);
            let handle =
                tokio::spawn(async move { provider.lookup(&transaction, &signals).await });
            async move { (name, tokio::time::timeout(timeout, handle).await) }
        });

        let mut sources = Vec::new();
        let mut fallbacks = Vec::new();
        let mut usage = LlmUsage::default();

        // Results are visited in registration order, so the merge is deterministic
        for (name, outcome) in join_all(lookups).await {
            let failure = match outcome {
                Ok(Ok(Ok(found))) => {
                    tracing::debug!(
                        provider = %name,
                        sources = found.sources.len(),
                        "Provider returned"
                    );
                    usage.merge(found.usage);
                    sources.extend(found.sources);
                    continue;
                }
                Ok(Ok(Err(e))) => {
                    usage.merge(e.usage());
                    (e.kind(), e.to_string())
                }
                Ok(Err(join_error)) if join_error.is_panic() => {
                    (FailureKind::Panicked, "provider task panicked".to_string())
                }
                Ok(Err(join_error)) => (FailureKind::Error, join_error.to_string()),
                Err(_) => (
                    FailureKind::Timeout,
                    format!("no response within {:?}", timeout),
                ),
            };

            tracing::warn!(
                phase = %Phase::Evidence,
                provider = %name,
                reason = %failure.0,
                branch = %FallbackBranch::ProviderSkipped,
                detail = %failure.1,
                "Threat provider isolated"
            );
            fallbacks.push(FallbackRecord::new(
                Phase::Evidence,
                name,
                failure.0,
                FallbackBranch::ProviderSkipped,
                failure.1,
            ));
        }

        GatherOutcome {
            result: ThreatIntelResult::from_sources(sources),
            fallbacks,
            usage,
        }
    }
}
