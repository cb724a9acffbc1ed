//! Policy retrieval.
//!
//! The vector index is an external dependency behind `PolicyIndex`. The
//! `PolicyRetriever` adds a deadline, caching and relevance scoring on top.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tribunal_core::config::RetrievalConfig;
use tribunal_core::retrieval::{score_chunks, ScoredChunk};
use tribunal_core::RetrievedChunk;

use crate::cache::{RetrievalCache, RetrievalKey};

mod memory;

pub use memory::{InMemoryPolicyIndex, PolicyDocument};

/// Errors from a policy index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Policy index unavailable: {0}")]
    Unavailable(String),

    #[error("Policy search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to load policies: {0}")]
    Load(String),
}

/// Nearest-neighbour search over policy chunks.
#[async_trait]
pub trait PolicyIndex: Send + Sync {
    /// Return up to `k` chunks nearest to `query`, closest first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, IndexError>;

    /// Index name for logging.
    fn name(&self) -> &str;
}

/// Cached, scored retrieval.
pub struct PolicyRetriever {
    index: Arc<dyn PolicyIndex>,
    cache: RetrievalCache,
    config: RetrievalConfig,
    timeout: Duration,
}

impl PolicyRetriever {
    pub fn new(index: Arc<dyn PolicyIndex>, config: RetrievalConfig, timeout: Duration) -> Self {
        Self {
            index,
            cache: RetrievalCache::new(config.cache_capacity, config.cache_ttl),
            config,
            timeout,
        }
    }

    /// Retrieve and score the policies relevant to `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, IndexError> {
        let key = RetrievalKey::new(query, self.config.search_k);

        let chunks = match self.cache.get(&key).await {
            Some(cached) => {
                tracing::debug!(index = self.index.name(), "Policy retrieval cache hit");
                cached.as_ref().clone()
            }
            None => {
                let chunks = tokio::time::timeout(
                    self.timeout,
                    self.index.search(query, self.config.search_k),
                )
                .await
                .map_err(|_| IndexError::Timeout(self.timeout))??;
                self.cache.insert(key, chunks.clone()).await;
                chunks
            }
        };

        Ok(score_chunks(
            chunks,
            self.config.relevance_floor,
            self.config.max_matches,
        ))
    }
}
