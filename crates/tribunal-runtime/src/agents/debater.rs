//! One side of the adversarial debate.

use std::sync::Arc;
use std::time::Duration;
use tribunal_core::debate::resolve_argument;
use tribunal_core::parser::parse_argument;
use tribunal_core::{
    AggregatedEvidence, Argument, FailureKind, FallbackBranch, FallbackRecord, LlmUsage, Phase,
    Stance, Transaction,
};

use crate::generation::Generator;
use crate::prompts;
use crate::providers::ChatMessage;

/// An argument plus what it cost and whether it is a fallback.
#[derive(Debug, Clone)]
pub struct DebateOutcome {
    pub argument: Argument,
    pub fallback: Option<FallbackRecord>,
    pub usage: LlmUsage,
}

/// Argues one stance. Sees only the evidence, never the other side.
pub struct DebateEvaluator {
    stance: Stance,
    generator: Arc<Generator>,
    timeout: Duration,
}

impl DebateEvaluator {
    pub fn new(stance: Stance, generator: Arc<Generator>, timeout: Duration) -> Self {
        Self {
            stance,
            generator,
            timeout,
        }
    }

    pub fn stance(&self) -> Stance {
        self.stance
    }

    pub async fn argue(
        &self,
        transaction: &Transaction,
        evidence: &AggregatedEvidence,
    ) -> DebateOutcome {
        let site = prompts::debate_site(self.stance);
        let messages = vec![
            ChatMessage::system(prompts::system_prompt(site)),
            ChatMessage::user(prompts::render_debate_request(transaction, evidence)),
        ];

        let mut usage = LlmUsage::default();
        let outcome = match self.generator.generate(site, messages, self.timeout).await {
            Ok(generation) => {
                usage.merge(generation.llm_usage());
                parse_argument(&generation.text)
                    .map_err(|e| (FailureKind::ParseFailed, e.to_string()))
            }
            Err(e) => Err((e.kind(), e.to_string())),
        };

        let fallback = outcome.as_ref().err().map(|(reason, detail)| {
            FallbackRecord::new(
                Phase::Debate,
                site.as_str(),
                *reason,
                FallbackBranch::DeterministicArgument,
                detail.clone(),
            )
        });
        let argument =
            resolve_argument(self.stance, outcome.map_err(|(reason, _)| reason), evidence);

        DebateOutcome {
            argument,
            fallback,
            usage,
        }
    }
}
