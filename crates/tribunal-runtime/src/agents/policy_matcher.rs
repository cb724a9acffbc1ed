//! Policy matching: retrieve candidate policies, then ask the model which apply.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tribunal_core::config::RetrievalConfig;
use tribunal_core::parser::parse_policy_matches;
use tribunal_core::retrieval::ScoredChunk;
use tribunal_core::{
    DerivedSignals, FailureKind, FallbackBranch, FallbackRecord, LlmUsage, Phase, PolicyMatch,
    PolicyMatchResult, Transaction,
};

use crate::generation::{CallSite, Generator};
use crate::prompts;
use crate::providers::ChatMessage;
use crate::retrieval::{IndexError, PolicyRetriever};

/// Result of one policy-matching pass.
#[derive(Debug, Clone, Default)]
pub struct PolicyMatchOutcome {
    pub result: PolicyMatchResult,
    pub fallback: Option<FallbackRecord>,
    pub usage: LlmUsage,
}

/// Search query describing what is unusual about the transaction.
pub fn build_query(transaction: &Transaction, signals: &DerivedSignals) -> String {
    let mut parts = signals.behavioral.anomalies.clone();
    parts.push(format!(
        "{} payment from {}",
        transaction.channel, transaction.country
    ));
    parts.join("; ")
}

pub struct PolicyMatcher {
    generator: Arc<Generator>,
    retriever: Arc<PolicyRetriever>,
    config: RetrievalConfig,
    timeout: Duration,
}

impl PolicyMatcher {
    pub fn new(
        generator: Arc<Generator>,
        retriever: Arc<PolicyRetriever>,
        config: RetrievalConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            retriever,
            config,
            timeout,
        }
    }

    pub async fn run(
        &self,
        transaction: &Transaction,
        signals: &DerivedSignals,
    ) -> PolicyMatchOutcome {
        let query = build_query(transaction, signals);

        let hits = match self.retriever.retrieve(&query).await {
            Ok(hits) => hits,
            Err(e) => {
                let reason = match e {
                    IndexError::Timeout(_) => FailureKind::Timeout,
                    _ => FailureKind::Error,
                };
                return PolicyMatchOutcome {
                    result: PolicyMatchResult::empty(),
                    fallback: Some(FallbackRecord::new(
                        Phase::Evidence,
                        "policy_index",
                        reason,
                        FallbackBranch::EmptyPolicyResult,
                        e.to_string(),
                    )),
                    usage: LlmUsage::default(),
                };
            }
        };

        // Nothing retrieved means nothing to adjudicate
        if hits.is_empty() {
            return PolicyMatchOutcome::default();
        }

        let chunk_ids = hits.iter().map(|h| h.chunk.id.clone()).collect();
        let messages = vec![
            ChatMessage::system(prompts::system_prompt(CallSite::PolicyMatcher)),
            ChatMessage::user(prompts::render_policy_request(transaction, signals, &hits)),
        ];

        let mut usage = LlmUsage::default();
        let outcome = match self
            .generator
            .generate(CallSite::PolicyMatcher, messages, self.timeout)
            .await
        {
            Ok(generation) => {
                usage.merge(generation.llm_usage());
                parse_policy_matches(&generation.text)
                    .map_err(|e| (FailureKind::ParseFailed, e.to_string()))
            }
            Err(e) => Err((e.kind(), e.to_string())),
        };

        let (matches, fallback) = match outcome {
            Ok(parsed) => (self.restrict_to_hits(parsed, &hits), None),
            Err((reason, detail)) => (
                Self::hits_as_matches(&hits),
                Some(FallbackRecord::new(
                    Phase::Evidence,
                    CallSite::PolicyMatcher.as_str(),
                    reason,
                    FallbackBranch::RetrievalHits,
                    detail,
                )),
            ),
        };

        PolicyMatchOutcome {
            result: PolicyMatchResult { matches, chunk_ids },
            fallback,
            usage,
        }
    }

    /// Keep only matches the retriever actually returned, then re-apply floor and cap.
    fn restrict_to_hits(&self, parsed: Vec<PolicyMatch>, hits: &[ScoredChunk]) -> Vec<PolicyMatch> {
        let retrieved: HashSet<&str> = hits.iter().map(|h| h.chunk.policy_id()).collect();
        let mut seen = HashSet::new();
        let mut matches: Vec<PolicyMatch> = parsed
            .into_iter()
            .filter(|m| retrieved.contains(m.policy_id.as_str()))
            .filter(|m| m.relevance >= self.config.relevance_floor)
            .filter(|m| seen.insert(m.policy_id.clone()))
            .collect();

        let dropped = retrieved.len().saturating_sub(matches.len());
        if dropped > 0 {
            tracing::debug!(dropped, "Retrieved policies not confirmed by matcher");
        }

        matches.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        matches.truncate(self.config.max_matches);
        matches
    }

    fn hits_as_matches(hits: &[ScoredChunk]) -> Vec<PolicyMatch> {
        hits.iter()
            .map(|hit| PolicyMatch {
                policy_id: hit.chunk.policy_id().to_string(),
                justification: format!(
                    "retrieved as relevant to the transaction: {}",
                    hit.chunk.metadata.get("title").unwrap_or(&hit.chunk.text)
                ),
                relevance: hit.relevance,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{OfflineProvider, ProviderError};
    use crate::resilience::CircuitBreaker;
    use crate::retrieval::{InMemoryPolicyIndex, PolicyIndex};
    use crate::testing::{behavior, transaction, FnProvider};
    use async_trait::async_trait;
    use tribunal_core::config::LlmSettings;
    use tribunal_core::{signals, RetrievedChunk};

    const POLICIES: &str = r#"
policies:
  - id: POL-AMT-001
    title: Unusual amount
    text: Transactions far above the customer's average require verification.
    keywords: [amount, average]
  - id: POL-DEV-003
    title: Unrecognised device
    text: Payments from devices not previously seen.
    keywords: [device]
"#;

    struct BrokenIndex;

    #[async_trait]
    impl PolicyIndex for BrokenIndex {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
            Err(IndexError::Unavailable("connection reset".to_string()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn matcher(
        provider: Arc<dyn crate::providers::LlmProvider>,
        index: Arc<dyn PolicyIndex>,
    ) -> PolicyMatcher {
        let generator = Generator::new(
            provider,
            Arc::new(CircuitBreaker::default()),
            LlmSettings::default(),
        );
        let config = RetrievalConfig::default();
        let retriever = PolicyRetriever::new(index, config.clone(), Duration::from_secs(10));
        PolicyMatcher::new(
            Arc::new(generator),
            Arc::new(retriever),
            config,
            Duration::from_secs(30),
        )
    }

    fn inputs() -> (Transaction, DerivedSignals) {
        let tx = transaction("tx-2", 1700.0, 3, "BR", "device-new");
        let derived = signals::derive(&tx, &behavior());
        (tx, derived)
    }

    #[test]
    fn test_query_includes_anomalies() {
        let (tx, derived) = inputs();
        let query = build_query(&tx, &derived);
        assert!(query.contains("17.0x the customer's average"));
        assert!(query.contains("unrecognised device"));
        assert!(query.ends_with("online payment from BR"));
    }

    #[tokio::test]
    async fn test_model_matches_restricted_to_retrieved() {
        let provider = FnProvider::new(|_| {
            Ok(r#"{"matches": [
                {"policy_id": "POL-DEV-003", "justification": "new device", "relevance": 0.8},
                {"policy_id": "POL-INVENTED-9", "justification": "made up", "relevance": 0.99},
                {"policy_id": "POL-AMT-001", "justification": "weak", "relevance": 0.2}
            ]}"#
            .to_string())
        });
        let index = InMemoryPolicyIndex::from_yaml(POLICIES).unwrap();
        let matcher = matcher(Arc::new(provider), Arc::new(index));
        let (tx, derived) = inputs();

        let outcome = matcher.run(&tx, &derived).await;
        assert!(outcome.fallback.is_none());
        assert_eq!(outcome.result.policy_ids(), vec!["POL-DEV-003"]);
        assert_eq!(outcome.result.chunk_ids.len(), 2);
        assert_eq!(outcome.usage.calls, 1);
    }

    #[tokio::test]
    async fn test_model_failure_uses_retrieval_hits() {
        let index = InMemoryPolicyIndex::from_yaml(POLICIES).unwrap();
        let matcher = matcher(Arc::new(OfflineProvider::new()), Arc::new(index));
        let (tx, derived) = inputs();

        let outcome = matcher.run(&tx, &derived).await;
        let fallback = outcome.fallback.unwrap();
        assert_eq!(fallback.branch, FallbackBranch::RetrievalHits);
        assert_eq!(fallback.reason, FailureKind::Error);
        assert_eq!(outcome.result.matches.len(), 2);
        assert_eq!(outcome.result.max_relevance(), Some(1.0));
    }

    #[tokio::test]
    async fn test_unparseable_answer_uses_retrieval_hits() {
        let provider = FnProvider::new(|_| Ok("these all look fine to me".to_string()));
        let index = InMemoryPolicyIndex::from_yaml(POLICIES).unwrap();
        let matcher = matcher(Arc::new(provider), Arc::new(index));
        let (tx, derived) = inputs();

        let outcome = matcher.run(&tx, &derived).await;
        assert_eq!(outcome.fallback.unwrap().reason, FailureKind::ParseFailed);
        assert_eq!(outcome.result.matches.len(), 2);
    }

    #[tokio::test]
    async fn test_index_failure_gives_empty_result() {
        let provider = FnProvider::new(|_| Err(ProviderError::NotConfigured("unused".to_string())));
        let matcher = matcher(Arc::new(provider), Arc::new(BrokenIndex));
        let (tx, derived) = inputs();

        let outcome = matcher.run(&tx, &derived).await;
        assert!(outcome.result.matches.is_empty());
        assert_eq!(outcome.fallback.unwrap().branch, FallbackBranch::EmptyPolicyResult);
        assert_eq!(outcome.usage.calls, 0);
    }

    #[tokio::test]
    async fn test_no_hits_skips_model() {
        let matcher = matcher(
            Arc::new(OfflineProvider::new()),
            Arc::new(InMemoryPolicyIndex::empty()),
        );
        let (tx, derived) = inputs();

        let outcome = matcher.run(&tx, &derived).await;
        assert!(outcome.result.matches.is_empty());
        assert!(outcome.fallback.is_none());
    }
}
