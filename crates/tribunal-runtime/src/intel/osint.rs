//! Model-backed open-source intelligence provider.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tribunal_core::parser::parse_threat_sources;
use tribunal_core::{Transaction, TransactionSignals};

use super::{ThreatLookup, ThreatProvider, ThreatProviderError};
use crate::generation::{CallSite, Generator};
use crate::prompts;
use crate::providers::ChatMessage;

/// Asks the model for public risk indicators about the merchant and country.
pub struct OsintProvider {
    generator: Arc<Generator>,
    timeout: Duration,
    enabled: bool,
}

impl OsintProvider {
    pub fn new(generator: Arc<Generator>, timeout: Duration, enabled: bool) -> Self {
        Self {
            generator,
            timeout,
            enabled,
        }
    }
}

#[async_trait]
impl ThreatProvider for OsintProvider {
    fn name(&self) -> &str {
        "osint"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn lookup(
        &self,
        transaction: &Transaction,
        _signals: &TransactionSignals,
    ) -> Result<ThreatLookup, ThreatProviderError> {
        let messages = vec![
            ChatMessage::system(prompts::system_prompt(CallSite::Osint)),
            ChatMessage::user(prompts::render_osint_request(transaction)),
        ];
        let generation = self
            .generator
            .generate(CallSite::Osint, messages, self.timeout)
            .await?;
        let usage = generation.llm_usage();
        match parse_threat_sources(&generation.text) {
            Ok(sources) => Ok(ThreatLookup { sources, usage }),
            Err(e) => Err(ThreatProviderError::MalformedGeneration {
                detail: e.to_string(),
                usage,
            }),
        }
    }
}
