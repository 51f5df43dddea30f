//! In-memory vector index.
//!
//! Useful for testing and for running without a managed index.

use super::{cosine_similarity, VectorError, VectorIndex, VectorMatch, VectorRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryVectorIndex {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, VectorError> {
        let records = self
            .records
            .read()
            .map_err(|_| VectorError::Response("index lock poisoned".to_string()))?;

        let mut matches: Vec<VectorMatch> = records
            .values()
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, VectorError> {
        let mut store = self
            .records
            .write()
            .map_err(|_| VectorError::Response("index lock poisoned".to_string()))?;
        let count = records.len();
        for record in records {
            store.insert(record.id.clone(), record);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn ranks_by_cosine_and_truncates() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![
                record("cust_1", vec![1.0, 0.0]),
                record("prod_2", vec![0.7, 0.7]),
                record("dc_3", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "cust_1");
        assert_eq!(matches[1].id, "prod_2");
    }

    #[tokio::test]
    async fn upsert_replaces_same_id() {
        let index = MemoryVectorIndex::new();
        index.upsert(vec![record("cust_1", vec![1.0])]).await.unwrap();
        index.upsert(vec![record("cust_1", vec![0.5])]).await.unwrap();
        assert_eq!(index.len(), 1);
    }
}
