//! Pipeline controller for a single fraud evaluation.
//!
//! Phases run strictly in order:
//! - Context: derive signals from the customer profile
//! - Evidence: policy matching and threat gathering in parallel, then aggregation
//! - Debate: pro-fraud and pro-customer evaluators in parallel
//! - Decision: deterministic arbiter
//! - Explanation: customer and audit texts
//!
//! Each fan-out is joined before the next phase reads its output. No phase
//! can fail the run; only a write-once violation in the state can.

use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

use tribunal_core::explanation::minimal_explanation;
use tribunal_core::{
    debate, signals, AggregatedEvidence, Argument, ConfigError, CustomerBehavior,
    DebateArguments, DecisionArbiter, DerivedSignals, EvidenceAggregator, ExplanationFacts,
    ExplanationResult, FailureKind, FallbackBranch, FallbackRecord, FraudDecision,
    OrchestratorState, Phase, PipelineConfig, PolicyMatchResult, ProCustomerHalf, ProFraudHalf,
    Stance, StateError, Transaction,
};

use crate::agents::{
    DebateEvaluator, DebateOutcome, ExplanationWriter, PolicyMatchOutcome, PolicyMatcher,
};
use crate::generation::{CallSite, Generator};
use crate::intel::{
    CountryRiskProvider, OsintProvider, ProviderGatherer, SanctionsProvider, ThreatProvider,
    OPENSANCTIONS_API_KEY_ENV,
};
use crate::providers::{ApiCredential, LlmProvider};
use crate::resilience::CircuitBreaker;
use crate::retrieval::{PolicyIndex, PolicyRetriever};

/// Errors from the pipeline controller.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Policy index not configured")]
    IndexNotConfigured,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("State invariant violated: {0}")]
    State(#[from] StateError),
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub decision: FraudDecision,
    pub explanation: ExplanationResult,

    /// Full run record, including the fallback trace and model usage
    pub state: OrchestratorState,
}

/// Multi-agent fraud pipeline.
///
/// Holds no per-run state; one instance serves any number of concurrent
/// runs. The circuit breaker is shared across them.
pub struct FraudPipeline {
    config: PipelineConfig,
    breaker: Arc<CircuitBreaker>,
    provider_name: String,
    policy_matcher: Arc<PolicyMatcher>,
    gatherer: ProviderGatherer,
    aggregator: EvidenceAggregator,
    pro_fraud: Arc<DebateEvaluator>,
    pro_customer: Arc<DebateEvaluator>,
    arbiter: DecisionArbiter,
    explainer: Arc<ExplanationWriter>,
}

impl FraudPipeline {
    pub fn builder() -> FraudPipelineBuilder {
        FraudPipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Names of the threat providers that run on every transaction.
    pub fn enabled_providers(&self) -> Vec<&str> {
        self.gatherer.enabled()
    }

    /// Score one transaction.
    pub async fn run(
        &self,
        transaction: Transaction,
        behavior: CustomerBehavior,
    ) -> Result<PipelineOutcome, PipelineError> {
        let span = tracing::info_span!(
            "fraud_pipeline",
            transaction_id = %transaction.id,
            provider = %self.provider_name
        );
        self.execute(transaction, behavior).instrument(span).await
    }

    async fn execute(
        &self,
        transaction: Transaction,
        behavior: CustomerBehavior,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut state = OrchestratorState::new(transaction, behavior);
        let transaction = Arc::new(state.transaction.clone());

        // Context
        let derived = signals::derive(&state.transaction, &state.behavior);
        tracing::debug!(
            phase = %Phase::Context,
            deviation = derived.behavioral.deviation_score,
            anomalies = derived.behavioral.anomalies.len(),
            "Signals derived"
        );
        state.set_signals(derived.clone())?;

        // Evidence
        let (matched, gathered) = tokio::join!(
            spawn_policy_match(
                Arc::clone(&self.policy_matcher),
                Arc::clone(&transaction),
                derived.clone(),
            ),
            self.gatherer
                .gather(Arc::clone(&transaction), Arc::new(derived.transaction.clone())),
        );
        state.record_usage(matched.usage);
        state.record_usage(gathered.usage);
        if let Some(record) = matched.fallback {
            note_fallback(&mut state, record);
        }
        for record in gathered.fallbacks {
            state.record_fallback(record);
        }
        state.set_policy_matches(matched.result)?;
        state.set_threat_intel(gathered.result)?;

        let evidence = self.aggregator.aggregate(
            state.policy_matches(Phase::Evidence)?,
            &state.signals(Phase::Evidence)?.behavioral,
            state.threat_intel(Phase::Evidence)?,
        );
        tracing::info!(
            phase = %Phase::Evidence,
            score = evidence.composite_risk_score,
            category = %evidence.risk_category,
            "Evidence aggregated"
        );
        state.set_evidence(evidence)?;

        // Debate
        let evidence = Arc::new(state.evidence(Phase::Debate)?.clone());
        let (pro_fraud, pro_customer) = tokio::join!(
            spawn_argument(
                Arc::clone(&self.pro_fraud),
                Arc::clone(&transaction),
                Arc::clone(&evidence),
            ),
            spawn_argument(
                Arc::clone(&self.pro_customer),
                Arc::clone(&transaction),
                Arc::clone(&evidence),
            ),
        );
        let pro_fraud = ProFraudHalf(absorb_argument(&mut state, pro_fraud));
        let pro_customer = ProCustomerHalf(absorb_argument(&mut state, pro_customer));
        state.set_debate(DebateArguments::join(pro_fraud, pro_customer))?;

        // Decision
        let decision = self.arbiter.decide(
            &state.transaction.id,
            state.evidence(Phase::Decision)?,
            state.debate(Phase::Decision)?,
            state.policy_matches(Phase::Decision)?,
        );
        tracing::info!(
            phase = %Phase::Decision,
            decision = %decision.decision,
            confidence = decision.confidence,
            escalated = decision.escalation_reason.is_some(),
            "Decision made"
        );
        state.set_decision(decision)?;

        // Explanation
        let facts = ExplanationFacts::new(
            state.decision(Phase::Explanation)?,
            state.evidence(Phase::Explanation)?,
            state.debate(Phase::Explanation)?,
            state.policy_matches(Phase::Explanation)?,
        );
        let writer = Arc::clone(&self.explainer);
        let task_facts = facts.clone();
        let handle = tokio::spawn(async move { writer.explain(&task_facts).await });
        let explanation = match handle.await {
            Ok(outcome) => {
                state.record_usage(outcome.usage);
                if let Some(record) = outcome.fallback {
                    note_fallback(&mut state, record);
                }
                outcome.result
            }
            Err(join_error) => {
                note_fallback(
                    &mut state,
                    FallbackRecord::new(
                        Phase::Explanation,
                        "explanation",
                        FailureKind::Panicked,
                        FallbackBranch::MinimalExplanation,
                        join_error.to_string(),
                    ),
                );
                minimal_explanation(
                    &facts.transaction_id,
                    facts.decision,
                    facts.risk_category,
                    &self.explainer.config().templates,
                )
            }
        };
        state.set_explanation(explanation)?;

        Ok(PipelineOutcome {
            decision: state.decision(Phase::Explanation)?.clone(),
            explanation: state.explanation(Phase::Explanation)?.clone(),
            state,
        })
    }
}

/// Run policy matching as its own task. A panic yields an empty result.
async fn spawn_policy_match(
    matcher: Arc<PolicyMatcher>,
    transaction: Arc<Transaction>,
    signals: DerivedSignals,
) -> PolicyMatchOutcome {
    let handle = tokio::spawn(async move { matcher.run(&transaction, &signals).await });
    match handle.await {
        Ok(outcome) => outcome,
        Err(join_error) => PolicyMatchOutcome {
            result: PolicyMatchResult::empty(),
            fallback: Some(FallbackRecord::new(
                Phase::Evidence,
                CallSite::PolicyMatcher.as_str(),
                FailureKind::Panicked,
                FallbackBranch::EmptyPolicyResult,
                join_error.to_string(),
            )),
            usage: Default::default(),
        },
    }
}

/// Run one evaluator as its own task. A panic yields the deterministic argument.
async fn spawn_argument(
    evaluator: Arc<DebateEvaluator>,
    transaction: Arc<Transaction>,
    evidence: Arc<AggregatedEvidence>,
) -> DebateOutcome {
    let stance = evaluator.stance();
    let task_evidence = Arc::clone(&evidence);
    let handle = tokio::spawn(async move { evaluator.argue(&transaction, &task_evidence).await });
    match handle.await {
        Ok(outcome) => outcome,
        Err(join_error) => DebateOutcome {
            argument: debate::fallback_argument(stance, &evidence),
            fallback: Some(FallbackRecord::new(
                Phase::Debate,
                stance.as_str(),
                FailureKind::Panicked,
                FallbackBranch::DeterministicArgument,
                join_error.to_string(),
            )),
            usage: Default::default(),
        },
    }
}

fn absorb_argument(state: &mut OrchestratorState, outcome: DebateOutcome) -> Argument {
    state.record_usage(outcome.usage);
    if let Some(record) = outcome.fallback {
        note_fallback(state, record);
    }
    outcome.argument
}

fn note_fallback(state: &mut OrchestratorState, record: FallbackRecord) {
    tracing::warn!(
        phase = %record.phase,
        call_site = %record.call_site,
        reason = %record.reason,
        branch = %record.branch,
        detail = %record.detail,
        "Fallback taken"
    );
    state.record_fallback(record);
}

/// Builder for FraudPipeline.
pub struct FraudPipelineBuilder {
    config: PipelineConfig,
    provider: Option<Arc<dyn LlmProvider>>,
    index: Option<Arc<dyn PolicyIndex>>,
    threat_providers: Vec<Arc<dyn ThreatProvider>>,
}

impl FraudPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            provider: None,
            index: None,
            threat_providers: Vec::new(),
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the LLM provider.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the policy index.
    pub fn index(mut self, index: Arc<dyn PolicyIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Register an extra threat provider, run after the built-in ones.
    pub fn threat_provider(mut self, provider: Arc<dyn ThreatProvider>) -> Self {
        self.threat_providers.push(provider);
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<FraudPipeline, PipelineError> {
        let provider = self
            .provider
            .ok_or_else(|| PipelineError::ProviderNotConfigured("No provider set".to_string()))?;
        let index = self.index.ok_or(PipelineError::IndexNotConfigured)?;
        let config = self.config;
        config.validate()?;

        let provider_name = provider.name().to_string();
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        let generator = Arc::new(Generator::new(
            provider,
            Arc::clone(&breaker),
            config.llm.clone(),
        ));
        let timeouts = &config.timeouts;

        let retriever = PolicyRetriever::new(index, config.retrieval.clone(), timeouts.retrieval);
        let policy_matcher = PolicyMatcher::new(
            Arc::clone(&generator),
            Arc::new(retriever),
            config.retrieval.clone(),
            timeouts.policy_match,
        );

        let mut providers: Vec<Arc<dyn ThreatProvider>> =
            vec![Arc::new(CountryRiskProvider::new())];
        providers.push(Arc::new(OsintProvider::new(
            Arc::clone(&generator),
            timeouts.provider,
            config.providers.osint_enabled,
        )));
        if config.providers.sanctions_enabled {
            match ApiCredential::from_config_or_env(
                config.providers.sanctions_api_key.as_deref(),
                OPENSANCTIONS_API_KEY_ENV,
                "OpenSanctions API key",
            ) {
                Ok(credential) => providers.push(Arc::new(SanctionsProvider::new(
                    credential,
                    config.providers.sanctions_endpoint.clone(),
                    config.providers.sanctions_min_score,
                ))),
                Err(e) => tracing::warn!(
                    provider = "sanctions",
                    error = %e,
                    "Sanctions screening disabled"
                ),
            }
        }
        providers.extend(self.threat_providers);
        let gatherer = ProviderGatherer::new(providers, timeouts.provider);

        let pro_fraud =
            DebateEvaluator::new(Stance::ProFraud, Arc::clone(&generator), timeouts.debate);
        let pro_customer =
            DebateEvaluator::new(Stance::ProCustomer, Arc::clone(&generator), timeouts.debate);
        let explainer = ExplanationWriter::new(
            Arc::clone(&generator),
            config.explanation.clone(),
            timeouts.explanation,
        );

        Ok(FraudPipeline {
            aggregator: EvidenceAggregator::new(config.aggregation, config.thresholds),
            arbiter: DecisionArbiter::new(config.arbiter.clone()),
            config,
            breaker,
            provider_name,
            policy_matcher: Arc::new(policy_matcher),
            gatherer,
            pro_fraud: Arc::new(pro_fraud),
            pro_customer: Arc::new(pro_customer),
            explainer: Arc::new(explainer),
        })
    }
}

impl Default for FraudPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{OfflineProvider, ProviderError};
    use crate::retrieval::{IndexError, InMemoryPolicyIndex};
    use crate::testing::{behavior, system_prompt, transaction, FnProvider};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::Instant;
    use tribunal_core::explanation::sanitizer::find_violation;
    use tribunal_core::{
        Decision, EscalationReason, ExplanationLevel, RetrievedChunk, RiskCategory,
    };

    const DEMO_POLICIES: &str = include_str!("../../../demos/policies.yaml");

    fn offline_pipeline() -> FraudPipeline {
        FraudPipeline::builder()
            .provider(Arc::new(OfflineProvider::new()))
            .index(Arc::new(InMemoryPolicyIndex::empty()))
            .build()
            .unwrap()
    }

    async fn score(tx: Transaction) -> PipelineOutcome {
        offline_pipeline().run(tx, behavior()).await.unwrap()
    }

    #[test]
    fn test_builder_requires_provider_and_index() {
        let missing_provider = FraudPipeline::builder()
            .index(Arc::new(InMemoryPolicyIndex::empty()))
            .build();
        assert!(matches!(missing_provider, Err(PipelineError::ProviderNotConfigured(_))));

        let missing_index = FraudPipeline::builder()
            .provider(Arc::new(OfflineProvider::new()))
            .build();
        assert!(matches!(missing_index, Err(PipelineError::IndexNotConfigured)));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.aggregation.policy = 0.9;
        let result = FraudPipeline::builder()
            .config(config)
            .provider(Arc::new(OfflineProvider::new()))
            .index(Arc::new(InMemoryPolicyIndex::empty()))
            .build();
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_unsafe_template() {
        let mut config = PipelineConfig::default();
        config.explanation.templates.challenge =
            "Your risk score was too high; please verify.".to_string();
        let result = FraudPipeline::builder()
            .config(config)
            .provider(Arc::new(OfflineProvider::new()))
            .index(Arc::new(InMemoryPolicyIndex::empty()))
            .build();
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_default_providers() {
        assert_eq!(offline_pipeline().enabled_providers(), vec!["country_risk"]);
    }

    #[tokio::test]
    async fn test_moderate_amount_off_hours_is_challenged() {
        let outcome = score(transaction("tx-s1", 360.0, 3, "US", "device-home")).await;

        assert_eq!(outcome.decision.decision, Decision::Challenge);
        assert!((outcome.decision.confidence - 0.95).abs() < 1e-9);
        let evidence = outcome.state.evidence(Phase::Explanation).unwrap();
        assert!((evidence.composite_risk_score - 30.25).abs() < 1e-9);
        assert_eq!(evidence.risk_category, RiskCategory::Medium);
    }

    #[tokio::test]
    async fn test_large_foreign_new_device_is_blocked() {
        let outcome = score(transaction("tx-s2", 1700.0, 3, "BR", "device-new")).await;

        assert_eq!(outcome.decision.decision, Decision::Block);
        assert!((outcome.decision.confidence - 0.70).abs() < 1e-9);
        let evidence = outcome.state.evidence(Phase::Explanation).unwrap();
        assert_eq!(evidence.risk_category, RiskCategory::High);
    }

    #[tokio::test]
    async fn test_routine_purchase_is_approved() {
        let outcome = score(transaction("tx-s3", 50.0, 12, "US", "device-home")).await;

        assert_eq!(outcome.decision.decision, Decision::Approve);
        assert!((outcome.decision.confidence - 0.775).abs() < 1e-9);
        assert_eq!(
            outcome.state.evidence(Phase::Explanation).unwrap().risk_category,
            RiskCategory::Low
        );
    }

    #[tokio::test]
    async fn test_conflicting_evidence_escalates() {
        let outcome = score(transaction("tx-s4", 400.0, 12, "CA", "device-home")).await;

        assert_eq!(outcome.decision.decision, Decision::EscalateToHuman);
        assert_eq!(outcome.decision.raw_decision, Decision::Challenge);
        assert!(matches!(
            outcome.decision.escalation_reason,
            Some(EscalationReason::ConflictingEvidence { .. })
        ));
        let threat = outcome.state.threat_intel(Phase::Explanation).unwrap();
        assert_eq!(threat.sources[0].origin, "fatf_low_ca");
    }

    #[tokio::test]
    async fn test_high_risk_jurisdiction_is_blocked() {
        let outcome = score(transaction("tx-s5", 3000.0, 2, "KP", "device-burner")).await;

        assert_eq!(outcome.decision.decision, Decision::Block);
        let evidence = outcome.state.evidence(Phase::Explanation).unwrap();
        assert!((evidence.composite_risk_score - 73.0).abs() < 1e-9);
        assert!(evidence.all_citations.iter().any(|c| c == "fatf_high_kp"));
    }

    #[tokio::test]
    async fn test_offline_run_records_every_fallback() {
        let outcome = score(transaction("tx-s1", 360.0, 3, "US", "device-home")).await;

        let sites: Vec<&str> = outcome
            .state
            .fallbacks()
            .iter()
            .map(|f| f.call_site.as_str())
            .collect();
        assert_eq!(sites, vec!["pro_fraud", "pro_customer", "explanation"]);
        assert_eq!(outcome.explanation.level, ExplanationLevel::Template);
        assert!(outcome.explanation.audit_explanation.contains("tx-s1"));
        assert_eq!(outcome.state.usage().calls, 0);
        assert!(outcome.state.completed_at().is_some());
    }

    #[tokio::test]
    async fn test_explanations_safe_and_auditable() {
        let denylist = PipelineConfig::default().explanation.denylist;
        let scenarios = [
            transaction("tx-s1", 360.0, 3, "US", "device-home"),
            transaction("tx-s2", 1700.0, 3, "BR", "device-new"),
            transaction("tx-s3", 50.0, 12, "US", "device-home"),
            transaction("tx-s4", 400.0, 12, "CA", "device-home"),
            transaction("tx-s5", 3000.0, 2, "KP", "device-burner"),
        ];
        for tx in scenarios {
            let id = tx.id.clone();
            let outcome = score(tx).await;
            let customer = &outcome.explanation.customer_explanation;
            assert!(
                find_violation(customer, &denylist).is_none(),
                "{}: {}",
                id,
                customer
            );

            let audit = &outcome.explanation.audit_explanation;
            let category = outcome.state.evidence(Phase::Explanation).unwrap().risk_category;
            assert!(audit.contains(&id));
            assert!(audit.contains(outcome.decision.decision.as_str()));
            assert!(audit.contains(category.as_str()));
        }
    }

    async fn score_with_demo_policies(tx: Transaction) -> PipelineOutcome {
        let index = InMemoryPolicyIndex::from_yaml(DEMO_POLICIES).unwrap();
        let pipeline = FraudPipeline::builder()
            .provider(Arc::new(OfflineProvider::new()))
            .index(Arc::new(index))
            .build()
            .unwrap();
        pipeline.run(tx, behavior()).await.unwrap()
    }

    #[tokio::test]
    async fn test_scenarios_hold_with_demo_policies() {
        let cases = [
            (transaction("tx-s1", 360.0, 3, "US", "device-home"), Decision::Challenge, 42.75, 2),
            (transaction("tx-s2", 1700.0, 3, "BR", "device-new"), Decision::Block, 80.0, 4),
            (transaction("tx-s3", 50.0, 12, "US", "device-home"), Decision::Approve, 0.0, 0),
            (
                transaction("tx-s4", 400.0, 12, "CA", "device-home"),
                Decision::EscalateToHuman,
                44.75,
                2,
            ),
            (transaction("tx-s5", 3000.0, 2, "KP", "device-burner"), Decision::Block, 98.0, 4),
        ];
        for (tx, expected, expected_score, policies) in cases {
            let id = tx.id.clone();
            let outcome = score_with_demo_policies(tx).await;
            let evidence = outcome.state.evidence(Phase::Explanation).unwrap();
            let matched = outcome.state.policy_matches(Phase::Explanation).unwrap();

            assert_eq!(outcome.decision.decision, expected, "{}", id);
            assert!(
                (evidence.composite_risk_score - expected_score).abs() < 1e-9,
                "{}: {}",
                id,
                evidence.composite_risk_score
            );
            assert_eq!(matched.matches.len(), policies, "{}", id);
        }
    }

    #[tokio::test]
    async fn test_amount_and_hour_policies_do_not_tip_into_block() {
        let outcome =
            score_with_demo_policies(transaction("tx-s1", 360.0, 3, "US", "device-home")).await;

        let matched = outcome.state.policy_matches(Phase::Explanation).unwrap();
        assert_eq!(matched.policy_ids(), vec!["POL-AMT-001", "POL-TIME-004"]);
        let evidence = outcome.state.evidence(Phase::Explanation).unwrap();
        assert_eq!(evidence.components.policy, Some(0.5));
        assert_eq!(evidence.risk_category, RiskCategory::Medium);
        assert_eq!(outcome.decision.decision, Decision::Challenge);
    }

    struct PanickingIndex;

    #[async_trait]
    impl PolicyIndex for PanickingIndex {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
            panic!("index driver bug")
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_policy_index_panic_is_isolated() {
        let pipeline = FraudPipeline::builder()
            .provider(Arc::new(OfflineProvider::new()))
            .index(Arc::new(PanickingIndex))
            .build()
            .unwrap();

        let outcome = pipeline
            .run(transaction("tx-p1", 360.0, 3, "US", "device-home"), behavior())
            .await
            .unwrap();

        assert_eq!(outcome.decision.decision, Decision::Challenge);
        assert!(outcome
            .state
            .policy_matches(Phase::Explanation)
            .unwrap()
            .matches
            .is_empty());
        let first = &outcome.state.fallbacks()[0];
        assert_eq!(first.call_site, "policy_matcher");
        assert_eq!(first.reason, FailureKind::Panicked);
        assert_eq!(first.branch, FallbackBranch::EmptyPolicyResult);
    }

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

    fn scripted(messages: &[crate::providers::ChatMessage]) -> Result<String, ProviderError> {
        let system = system_prompt(messages);
        let reply = if system.contains("Role: Policy Matcher") {
            r#"{"matches": [
                {"policy_id": "POL-AMT-001", "justification": "17x average", "relevance": 0.9},
                {"policy_id": "POL-DEV-003", "justification": "new device", "relevance": 0.9}
            ]}"#
        } else if system.contains("Pro-Fraud Advocate") {
            r#"{"argument": "Amount, device and hour all deviate.", "confidence": 0.85,
                "citations": ["policy POL-AMT-001", "unrecognised device device-new"]}"#
        } else if system.contains("Pro-Customer Advocate") {
            r#"{"argument": "Customers do travel.", "confidence": 0.2,
                "citations": [
                    "country BR is not among the customer's usual countries",
                    "policy POL-AMT-001"
                ]}"#
        } else if system.contains("Open-Source Intelligence Analyst") {
            r#"{"indicators": [{"id": "chargeback_ring",
                "description": "merchant linked to chargeback reports", "confidence": 0.3}]}"#
        } else if system.contains("Explanation Writer") {
            r#"{"customer_explanation": "We stopped this payment to protect your account.",
                "audit_explanation": "Blocked after amount and device deviation."}"#
        } else {
            return Err(ProviderError::ParseError("unexpected prompt".to_string()));
        };
        Ok(reply.to_string())
    }

    #[tokio::test]
    async fn test_model_path_end_to_end() {
        let pipeline = FraudPipeline::builder()
            .provider(Arc::new(FnProvider::new(scripted)))
            .index(Arc::new(InMemoryPolicyIndex::from_yaml(POLICIES).unwrap()))
            .build()
            .unwrap();

        let outcome = pipeline
            .run(transaction("tx-m1", 1700.0, 3, "BR", "device-new"), behavior())
            .await
            .unwrap();

        assert!(outcome.state.fallbacks().is_empty(), "{:?}", outcome.state.fallbacks());
        assert_eq!(outcome.decision.decision, Decision::Block);
        assert!((outcome.decision.confidence - 0.825).abs() < 1e-9);
        assert_eq!(outcome.state.usage().calls, 4);
        assert_eq!(outcome.explanation.level, ExplanationLevel::Model);
        assert!(outcome.explanation.audit_explanation.contains("POL-AMT-001"));
        assert!(outcome.explanation.audit_explanation.contains("POL-DEV-003"));

        // two corroborating policies at 0.9: 0.25 * 0.45 + 0.55 * 1.0
        let evidence = outcome.state.evidence(Phase::Explanation).unwrap();
        assert!((evidence.composite_risk_score - 66.25).abs() < 1e-9);
        assert_eq!(evidence.risk_category, RiskCategory::High);
        for site in [CallSite::ProFraud, CallSite::ProCustomer] {
            assert!(matches!(
                pipeline.circuit_breaker().state(site),
                crate::resilience::CircuitState::Closed { failures: 0 }
            ));
        }
    }

    #[tokio::test]
    async fn test_osint_usage_counted() {
        let mut config = PipelineConfig::default();
        config.providers.osint_enabled = true;
        let pipeline = FraudPipeline::builder()
            .config(config)
            .provider(Arc::new(FnProvider::new(scripted)))
            .index(Arc::new(InMemoryPolicyIndex::from_yaml(POLICIES).unwrap()))
            .build()
            .unwrap();
        assert_eq!(pipeline.enabled_providers(), vec!["country_risk", "osint"]);

        let outcome = pipeline
            .run(transaction("tx-m2", 1700.0, 3, "BR", "device-new"), behavior())
            .await
            .unwrap();

        assert!(outcome.state.fallbacks().is_empty(), "{:?}", outcome.state.fallbacks());
        let threat = outcome.state.threat_intel(Phase::Explanation).unwrap();
        assert_eq!(threat.sources[0].origin, "osint_chargeback_ring");
        let usage = outcome.state.usage();
        assert_eq!(usage.calls, 5);
        assert_eq!(usage.input_tokens, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_model_bounded_by_deadlines() {
        let provider =
            FnProvider::new(|_| Ok("late".to_string())).with_delay(Duration::from_secs(3600));
        let pipeline = FraudPipeline::builder()
            .provider(Arc::new(provider))
            .index(Arc::new(InMemoryPolicyIndex::empty()))
            .build()
            .unwrap();

        let start = Instant::now();
        let outcome = pipeline
            .run(transaction("tx-t1", 360.0, 3, "US", "device-home"), behavior())
            .await
            .unwrap();
        let elapsed = start.elapsed();

        // debate (30s, both sides concurrently) then explanation (30s)
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(61), "took {:?}", elapsed);
        assert_eq!(outcome.decision.decision, Decision::Challenge);
        assert!(outcome
            .state
            .fallbacks()
            .iter()
            .all(|f| f.reason == FailureKind::Timeout));
        assert_eq!(outcome.state.fallbacks().len(), 3);
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let pipeline = Arc::new(offline_pipeline());
        let first = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .run(transaction("tx-a", 50.0, 12, "US", "device-home"), behavior())
                    .await
            })
        };
        let second = pipeline
            .run(transaction("tx-b", 1700.0, 3, "BR", "device-new"), behavior())
            .await
            .unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first.decision.transaction_id, "tx-a");
        assert_eq!(first.decision.decision, Decision::Approve);
        assert_eq!(second.decision.transaction_id, "tx-b");
        assert_eq!(second.decision.decision, Decision::Block);
    }
}
