//! OpenAI-compatible `/embeddings` client.

use super::{Embedder, EmbeddingError};
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

// OpenAI has a limit on batch size, process in chunks
const BATCH_SIZE: usize = 100;

pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            EmbeddingError::Config("API key is required for the embedding provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Response("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let request = EmbeddingRequest {
                model: &self.model,
                input: chunk,
            };

            let response = self
                .client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| EmbeddingError::Request(e.to_string()))?;

            if !response.status().is_success() {
                return Err(EmbeddingError::Response(format!(
                    "Embedding API responded with status code: {}",
                    response.status()
                )));
            }

            let parsed: EmbeddingResponse = response
                .json()
                .await
                .map_err(|e| EmbeddingError::Response(e.to_string()))?;

            all_embeddings.extend(order_embeddings(parsed.data));
        }

        debug!("Generated {} embeddings", all_embeddings.len());
        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// Sort by index to ensure correct order
fn order_embeddings(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    data.sort_by_key(|d| d.index);
    data.into_iter().map(|d| d.embedding).collect()
}
