//! Keyword-overlap policy index for offline use and tests.
//!
//! Each policy lists keywords. A query's distance to a policy is
//! `-ln(fraction of the policy's keywords present in the query)`, so a policy
//! whose keywords all appear scores relevance 1.0 after `exp(-distance)`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tribunal_core::RetrievedChunk;

use super::{IndexError, PolicyIndex};

/// A fraud policy as written in a policy file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyDocument {
    pub id: String,
    pub title: String,
    pub text: String,
    pub keywords: Vec<String>,
}

#[derive(Deserialize)]
struct PolicyFile {
    policies: Vec<PolicyDocument>,
}

/// In-memory index over a fixed set of policy documents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPolicyIndex {
    documents: Vec<PolicyDocument>,
}

impl InMemoryPolicyIndex {
    pub fn new(documents: Vec<PolicyDocument>) -> Self {
        Self { documents }
    }

    /// An index with no policies; every search returns nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a YAML document of the form `policies: [{id, title, text, keywords}]`.
    pub fn from_yaml(yaml: &str) -> Result<Self, IndexError> {
        let file: PolicyFile =
            serde_yaml::from_str(yaml).map_err(|e| IndexError::Load(e.to_string()))?;
        Ok(Self::new(file.policies))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| IndexError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&raw)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn distance(document: &PolicyDocument, query: &str) -> Option<f64> {
        if document.keywords.is_empty() {
            return None;
        }
        let hits = document
            .keywords
            .iter()
            .filter(|k| query.contains(&k.to_lowercase()))
            .count();
        if hits == 0 {
            return None;
        }
        let fraction = hits as f64 / document.keywords.len() as f64;
        Some(-fraction.ln())
    }
}

#[async_trait]
impl PolicyIndex for InMemoryPolicyIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        let query = query.to_lowercase();
        let mut hits: Vec<RetrievedChunk> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let distance = Self::distance(doc, &query)?;
                let mut metadata = BTreeMap::new();
                metadata.insert("policy_id".to_string(), doc.id.clone());
                metadata.insert("title".to_string(), doc.title.clone());
                Some(RetrievedChunk {
                    id: doc.id.clone(),
                    text: doc.text.clone(),
                    distance,
                    metadata,
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const POLICIES: &str = r#"
policies:
  - id: POL-AMT-001
    title: Unusual amount
    text: Transactions far above the customer's average require verification.
    keywords: [amount, average]
  - id: POL-GEO-002
    title: New geography
    text: Purchases from countries the customer has not used before.
    keywords: [country, foreign, unusual]
  - id: POL-DEV-003
    title: Unrecognised device
    text: Payments from devices not previously seen.
    keywords: [device]
"#;

    #[tokio::test]
    async fn test_full_overlap_is_distance_zero() {
        let index = InMemoryPolicyIndex::from_yaml(POLICIES).unwrap();
        assert_eq!(index.len(), 3);

        let hits = index.search("Amount is 17x the average", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].policy_id(), "POL-AMT-001");
        assert_eq!(hits[0].distance, 0.0);
    }

    #[tokio::test]
    async fn test_partial_overlap_and_ordering() {
        let index = InMemoryPolicyIndex::from_yaml(POLICIES).unwrap();
        let hits = index
            .search("unrecognised device in a foreign country", 10)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["POL-DEV-003", "POL-GEO-002"]);
        // two of three keywords
        assert!((hits[1].distance - (1.5f64).ln()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_k_limits_results() {
        let index = InMemoryPolicyIndex::from_yaml(POLICIES).unwrap();
        let hits = index.search("amount device country", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            InMemoryPolicyIndex::from_yaml("policies: 3"),
            Err(IndexError::Load(_))
        ));
    }

    proptest! {
        #[test]
        fn test_relevance_is_keyword_fraction(present in 1usize..=4) {
            let keywords = ["amount", "device", "country", "hours"];
            let document = PolicyDocument {
                id: "POL-X".to_string(),
                title: "x".to_string(),
                text: "x".to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            };
            let query = keywords[..present].join(" ");
            let distance = InMemoryPolicyIndex::distance(&document, &query).unwrap();
            prop_assert!(distance >= 0.0);
            prop_assert!(((-distance).exp() - present as f64 / 4.0).abs() < 1e-9);
        }
    }
}
