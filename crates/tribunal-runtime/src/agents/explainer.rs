//! Customer and audit explanations of a decision.

use std::sync::Arc;
use std::time::Duration;
use tribunal_core::config::ExplanationConfig;
use tribunal_core::explanation::{finalize, templates::template_explanation};
use tribunal_core::parser::parse_explanation;
use tribunal_core::{
    ExplanationFacts, ExplanationResult, FailureKind, FallbackBranch, FallbackRecord, LlmUsage,
    Phase,
};

use crate::generation::{CallSite, Generator};
use crate::prompts;
use crate::providers::ChatMessage;

#[derive(Debug, Clone)]
pub struct ExplanationOutcome {
    pub result: ExplanationResult,
    pub fallback: Option<FallbackRecord>,
    pub usage: LlmUsage,
}

pub struct ExplanationWriter {
    generator: Arc<Generator>,
    config: ExplanationConfig,
    timeout: Duration,
}

impl ExplanationWriter {
    pub fn new(generator: Arc<Generator>, config: ExplanationConfig, timeout: Duration) -> Self {
        Self {
            generator,
            config,
            timeout,
        }
    }

    pub fn config(&self) -> &ExplanationConfig {
        &self.config
    }

    pub async fn explain(&self, facts: &ExplanationFacts) -> ExplanationOutcome {
        let messages = vec![
            ChatMessage::system(prompts::system_prompt(CallSite::Explanation)),
            ChatMessage::user(prompts::render_explanation_request(facts)),
        ];

        let mut usage = LlmUsage::default();
        let parsed = match self
            .generator
            .generate(CallSite::Explanation, messages, self.timeout)
            .await
        {
            Ok(generation) => {
                usage.merge(generation.llm_usage());
                parse_explanation(&generation.text)
                    .map_err(|e| (FailureKind::ParseFailed, e.to_string()))
            }
            Err(e) => Err((e.kind(), e.to_string())),
        };

        match parsed {
            Ok(parsed) => {
                let (result, sanitized) = finalize(parsed, facts, &self.config);
                if let Some(term) = &sanitized.violation {
                    tracing::warn!(
                        transaction_id = %facts.transaction_id,
                        term = %term,
                        "Customer explanation replaced with safe template"
                    );
                }
                ExplanationOutcome {
                    result,
                    fallback: None,
                    usage,
                }
            }
            Err((reason, detail)) => ExplanationOutcome {
                result: template_explanation(facts, &self.config.templates),
                fallback: Some(FallbackRecord::new(
                    Phase::Explanation,
                    CallSite::Explanation.as_str(),
                    reason,
                    FallbackBranch::TemplateExplanation,
                    detail,
                )),
                usage,
            },
        }
    }
}
