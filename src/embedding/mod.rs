//! Embedding generation for semantic search and index ingestion.

mod openai;

pub use openai::OpenAIEmbedder;

use async_trait::async_trait;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding configuration error: {0}")]
    Config(String),
    #[error("Embedding request failed: {0}")]
    Request(String),
    #[error("Embedding response error: {0}")]
    Response(String),
}

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// What `validate_embedding` found wrong with a vector.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EmbeddingReport {
    pub non_finite: Vec<usize>,
    pub dimension_mismatch: Option<(usize, usize)>,
}

impl EmbeddingReport {
    pub fn is_clean(&self) -> bool {
        self.non_finite.is_empty() && self.dimension_mismatch.is_none()
    }
}

/// Checks a query vector for NaN/Inf entries and an unexpected length.
///
/// Anomalies are logged, never fatal: the vector is still sent to the index.
pub fn validate_embedding(vector: &[f32], expected_dim: usize) -> EmbeddingReport {
    let non_finite: Vec<usize> = vector
        .iter()
        .enumerate()
        .filter(|(_, x)| !x.is_finite())
        .map(|(i, _)| i)
        .collect();

    let dimension_mismatch = (vector.len() != expected_dim).then_some((vector.len(), expected_dim));

    debug!("Query embedding length = {}", vector.len());
    if !non_finite.is_empty() {
        let shown: Vec<usize> = non_finite.iter().take(10).copied().collect();
        warn!("Embedding has {} NaN/Inf entries, first at {:?}", non_finite.len(), shown);
    }
    if let Some((got, want)) = dimension_mismatch {
        warn!("Embedding dimension mismatch: {} vs {}", got, want);
    }

    EmbeddingReport {
        non_finite,
        dimension_mismatch,
    }
}
