//! Language-model provider abstraction.
//!
//! Model clients are supplied by the embedding application. This crate only
//! depends on the `LlmProvider` trait and ships an `OfflineProvider` that
//! simulates a total outage.
//!
//! ## Security
//!
//! Credentials go through the [`secrets`] module. See [`ApiCredential`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod offline;
pub mod secrets;

pub use offline::OfflineProvider;
pub use secrets::{ApiCredential, CredentialSource};

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            ProviderError::ParseError(_)
            | ProviderError::AuthError
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

/// Per-request settings handed to the provider.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Deadline for a single attempt; the `Generator` bounds all attempts
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 800,
            temperature: 0.0,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Text and accounting for one completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    /// Model that actually served the request
    pub model: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// Only the `Generator` calls this; agents go through it so that every call
/// gets a deadline, retries and a circuit breaker.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is healthy.
    async fn health_check(&self) -> bool;

    /// Get provider name for logging.
    fn name(&self) -> &str;
}
