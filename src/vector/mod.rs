//! Nearest-neighbour index over entity embeddings.

mod memory;
mod pinecone;

pub use memory::MemoryVectorIndex;
pub use pinecone::PineconeIndex;

use crate::config::VectorConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("Vector index configuration error: {0}")]
    Config(String),
    #[error("Vector index request failed: {0}")]
    Request(String),
    #[error("Vector index response error: {0}")]
    Response(String),
}

/// A ranked match returned by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A vector to upsert, keyed by a prefixed entity id such as `cust_42`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top `top_k` matches for `vector`, best first, metadata included.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, VectorError>;

    /// Insert or replace records; returns how many were written.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, VectorError>;
}

/// Builds the configured backend: `pinecone` or `memory`.
pub fn from_config(config: &VectorConfig) -> Result<Arc<dyn VectorIndex>, VectorError> {
    match config.backend.as_str() {
        "pinecone" => Ok(Arc::new(PineconeIndex::new(config)?)),
        "memory" => Ok(Arc::new(MemoryVectorIndex::new())),
        other => Err(VectorError::Config(format!("Unsupported vector backend: {}", other))),
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &[1.0, 0.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert!((cosine_similarity(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[test]
    fn backend_is_chosen_by_name() {
        let memory = VectorConfig {
            backend: "memory".to_string(),
            ..VectorConfig::default()
        };
        assert!(from_config(&memory).is_ok());
        assert!(matches!(from_config(&VectorConfig::default()), Err(VectorError::Config(_))));
    }

    #[test]
    fn match_tolerates_missing_metadata() {
        let m: VectorMatch = serde_json::from_str(r#"{"id":"cust_1","score":0.5}"#).unwrap();
        assert_eq!(m.id, "cust_1");
        assert!(m.metadata.is_empty());
    }
}
