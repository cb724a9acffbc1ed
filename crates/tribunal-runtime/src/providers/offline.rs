//! Provider that is never reachable.
//!
//! Running the pipeline against it exercises every deterministic fallback,
//! which is how the CLI scores transactions without a model client.

use async_trait::async_trait;

use super::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};

/// Always fails with `ProviderError::NotConfigured`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProvider;

impl OfflineProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmProvider for OfflineProvider {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "offline mode: no model provider available".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "offline"
    }
}
