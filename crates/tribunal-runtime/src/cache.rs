//! Caching layer for policy retrieval.
//!
//! Retrieval for the same signal profile returns the same chunks, so raw
//! index results are cached by query to spare the index.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tribunal_core::RetrievedChunk;

/// Cache key for retrieval results.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RetrievalKey {
    query: String,
    k: usize,
}

impl RetrievalKey {
    pub fn new(query: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            k,
        }
    }
}

/// Retrieval cache using moka.
pub struct RetrievalCache {
    cache: Cache<RetrievalKey, Arc<Vec<RetrievedChunk>>>,
}

impl RetrievalCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &RetrievalKey) -> Option<Arc<Vec<RetrievedChunk>>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: RetrievalKey, chunks: Vec<RetrievedChunk>) {
        self.cache.insert(key, Arc::new(chunks)).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for RetrievalCache {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = RetrievalCache::default();
        let key = RetrievalKey::new("amount 17.0x average", 10);

        assert!(cache.get(&key).await.is_none());

        let chunk = RetrievedChunk {
            id: "POL-AMT-001".to_string(),
            text: "Large amounts".to_string(),
            distance: 0.1,
            metadata: BTreeMap::new(),
        };
        cache.insert(key.clone(), vec![chunk]).await;

        let cached = cache.get(&key).await.unwrap();
        assert_eq!(cached[0].id, "POL-AMT-001");

        // Same query with a different k is a different entry
        assert!(cache.get(&RetrievalKey::new("amount 17.0x average", 5)).await.is_none());
    }
}
