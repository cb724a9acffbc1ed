//! The single wrapper through which every model call goes.
//!
//! `Generator::generate` applies, in order: the call site's circuit breaker,
//! retry with exponential backoff on transient errors, and an overall
//! deadline around all attempts. The result is an explicit
//! `Result<Generation, CallFailure>` for the caller's fallback ladder.

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tribunal_core::config::LlmSettings;
use tribunal_core::{FailureKind, LlmUsage};

use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError, TokenUsage};
use crate::resilience::CircuitBreaker;

/// Every place in the pipeline that calls the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CallSite {
    PolicyMatcher,
    ProFraud,
    ProCustomer,
    Explanation,
    Osint,
}

impl CallSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallSite::PolicyMatcher => "policy_matcher",
            CallSite::ProFraud => "pro_fraud",
            CallSite::ProCustomer => "pro_customer",
            CallSite::Explanation => "explanation",
            CallSite::Osint => "osint",
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a model call produced no text.
#[derive(Error, Debug)]
pub enum CallFailure {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Circuit open for {0}")]
    CircuitOpen(CallSite),
}

impl CallFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            CallFailure::Timeout(_) => FailureKind::Timeout,
            CallFailure::Provider(_) => FailureKind::Error,
            CallFailure::CircuitOpen(_) => FailureKind::CircuitOpen,
        }
    }
}

/// Text produced by a successful call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

impl Generation {
    pub fn llm_usage(&self) -> LlmUsage {
        let mut usage = LlmUsage::default();
        usage.record(self.usage.prompt_tokens, self.usage.completion_tokens);
        usage
    }
}

/// Resilient front for an `LlmProvider`.
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    breaker: Arc<CircuitBreaker>,
    settings: LlmSettings,
}

impl Generator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        breaker: Arc<CircuitBreaker>,
        settings: LlmSettings,
    ) -> Self {
        Self {
            provider,
            breaker,
            settings,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Call the model for `site`, bounded by `timeout` across all retries.
    pub async fn generate(
        &self,
        site: CallSite,
        messages: Vec<ChatMessage>,
        timeout: Duration,
    ) -> Result<Generation, CallFailure> {
        if self.breaker.is_open(site) {
            tracing::warn!(call_site = %site, "Circuit open, skipping model call");
            return Err(CallFailure::CircuitOpen(site));
        }

        let config = CompletionConfig {
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            timeout,
        };
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.settings.max_retries);

        let attempts = (|| self.provider.complete(messages.clone(), &config))
            .retry(backoff)
            .when(ProviderError::is_transient)
            .notify(|err: &ProviderError, delay: Duration| {
                tracing::debug!(
                    call_site = %site,
                    error = %err,
                    delay = ?delay,
                    "Retrying model call"
                );
            });

        match tokio::time::timeout(timeout, attempts).await {
            Ok(Ok(response)) => {
                self.breaker.record_success(site);
                tracing::debug!(
                    call_site = %site,
                    provider = self.provider.name(),
                    tokens = response.usage.total(),
                    "Model call succeeded"
                );
                Ok(Generation {
                    text: response.content,
                    usage: response.usage,
                })
            }
            Ok(Err(e)) => {
                self.breaker.record_failure(site);
                tracing::warn!(call_site = %site, error = %e, "Model call failed");
                Err(CallFailure::Provider(e))
            }
            Err(_) => {
                self.breaker.record_failure(site);
                tracing::warn!(call_site = %site, timeout = ?timeout, "Model call timed out");
                Err(CallFailure::Timeout(timeout))
            }
        }
    }
}
