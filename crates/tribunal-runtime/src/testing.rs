//! Test doubles shared by the runtime's unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::time::Duration;
use tribunal_core::{CustomerBehavior, HourRange, Transaction};

use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, Role,
    TokenUsage,
};

/// Provider whose responses come from a closure over the messages.
pub struct FnProvider<F> {
    respond: F,
    delay: Option<Duration>,
}

impl<F> FnProvider<F>
where
    F: Fn(&[ChatMessage]) -> Result<String, ProviderError> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl<F> LlmProvider for FnProvider<F>
where
    F: Fn(&[ChatMessage]) -> Result<String, ProviderError> + Send + Sync,
{
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let content = (self.respond)(messages.as_slice())?;
        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 40,
            },
            model: config.model.clone(),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// System prompt of the call, used by scripted providers to route responses.
pub fn system_prompt(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// Customer who shops in the US on one device between 08:00 and 20:00 UTC.
pub fn behavior() -> CustomerBehavior {
    CustomerBehavior {
        customer_id: "cust-001".to_string(),
        average_amount: 100.0,
        usual_hours: HourRange::new(8, 20),
        usual_countries: vec!["US".to_string()],
        usual_devices: vec!["device-home".to_string()],
    }
}

pub fn transaction(id: &str, amount: f64, hour: u32, country: &str, device: &str) -> Transaction {
    Transaction {
        id: id.to_string(),
        customer_id: "cust-001".to_string(),
        amount,
        currency: "USD".to_string(),
        country: country.to_string(),
        channel: "online".to_string(),
        device_id: device.to_string(),
        timestamp: Utc
            .with_ymd_and_hms(2025, 6, 3, hour, 30, 0)
            .single()
            .unwrap_or_else(Utc::now),
        merchant_id: "merchant-77".to_string(),
    }
}
