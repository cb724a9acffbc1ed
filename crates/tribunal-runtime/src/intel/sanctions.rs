//! OpenSanctions entity matching for the merchant.
//!
//! Requires the `http-providers` feature and an API key, either in the
//! pipeline configuration or in `OPENSANCTIONS_API_KEY`.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tribunal_core::threat::SANCTIONS_PREFIX;
use tribunal_core::{ThreatSource, Transaction, TransactionSignals};

use super::{ThreatLookup, ThreatProvider, ThreatProviderError};
use crate::providers::ApiCredential;

pub const OPENSANCTIONS_API_KEY_ENV: &str = "OPENSANCTIONS_API_KEY";

#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(default)]
    responses: HashMap<String, QueryResponse>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<MatchResult>,
}

#[derive(Debug, Deserialize)]
struct MatchResult {
    id: String,
    #[serde(default)]
    caption: String,
    #[serde(default)]
    score: f64,
}

/// Sanctions screening of the merchant against OpenSanctions.
pub struct SanctionsProvider {
    credential: ApiCredential,
    endpoint: String,
    min_score: f64,
    #[cfg(feature = "http-providers")]
    client: reqwest::Client,
}

impl SanctionsProvider {
    pub fn new(credential: ApiCredential, endpoint: impl Into<String>, min_score: f64) -> Self {
        Self {
            credential,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            min_score,
            #[cfg(feature = "http-providers")]
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[cfg_attr(not(feature = "http-providers"), allow(dead_code))]
    fn request_body(transaction: &Transaction) -> serde_json::Value {
        serde_json::json!({
            "queries": {
                "q1": {
                    "schema": "Company",
                    "properties": {
                        "name": [transaction.merchant_id],
                        "country": [transaction.country.to_lowercase()],
                    }
                }
            }
        })
    }

    /// Matches at or above the minimum score, as threat sources.
    fn sources_from(&self, body: &str) -> Result<Vec<ThreatSource>, ThreatProviderError> {
        let parsed: MatchResponse = serde_json::from_str(body)
            .map_err(|e| ThreatProviderError::Malformed(e.to_string()))?;
        let results = parsed
            .responses
            .into_values()
            .flat_map(|r| r.results)
            .filter(|r| r.score >= self.min_score)
            .map(|r| {
                ThreatSource::new(
                    format!("{}{}", SANCTIONS_PREFIX, r.id),
                    r.score,
                    format!("merchant matches sanctioned entity {}", r.caption),
                )
            })
            .collect();
        Ok(results)
    }

    #[cfg(feature = "http-providers")]
    async fn fetch(&self, transaction: &Transaction) -> Result<String, ThreatProviderError> {
        let response = self
            .client
            .post(format!("{}/match/default", self.endpoint))
            .header("Authorization", format!("ApiKey {}", self.credential.expose()))
            .json(&Self::request_body(transaction))
            .send()
            .await
            .map_err(|e| ThreatProviderError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ThreatProviderError::Request(format!(
                "{} returned {}",
                self.credential.name(),
                status.as_u16()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ThreatProviderError::Request(e.to_string()))
    }

    #[cfg(not(feature = "http-providers"))]
    async fn fetch(&self, _transaction: &Transaction) -> Result<String, ThreatProviderError> {
        Err(ThreatProviderError::NotConfigured(format!(
            "{} is set but the http-providers feature is off",
            self.credential.name()
        )))
    }
}

#[async_trait]
impl ThreatProvider for SanctionsProvider {
    fn name(&self) -> &str {
        "sanctions"
    }

    async fn lookup(
        &self,
        transaction: &Transaction,
        _signals: &TransactionSignals,
    ) -> Result<ThreatLookup, ThreatProviderError> {
        let body = self.fetch(transaction).await?;
        self.sources_from(&body).map(ThreatLookup::from)
    }
}
