//! Pinecone data-plane client (`/query`, `/vectors/upsert`).

use super::{VectorError, VectorIndex, VectorMatch, VectorRecord};
use crate::config::VectorConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const UPSERT_BATCH: usize = 100;

pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

impl PineconeIndex {
    pub fn new(config: &VectorConfig) -> Result<Self, VectorError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| VectorError::Config("PINECONE_API_KEY is not set".to_string()))?;
        let host = config
            .index_host
            .clone()
            .ok_or_else(|| VectorError::Config("Pinecone index host is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VectorError::Request(e.to_string()))?;

        Ok(Self {
            client,
            host: normalize_host(&host),
            api_key,
            namespace: config.namespace.clone(),
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, VectorError> {
        let url = format!("{}{}", self.host, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| VectorError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Pinecone responded with status code: {} - {}", status, body);
            return Err(VectorError::Response(format!(
                "Pinecone responded with status code: {}",
                status
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, VectorError> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };
        let response: QueryResponse = self
            .post("/query", &request)
            .await?
            .json()
            .await
            .map_err(|e| VectorError::Response(e.to_string()))?;
        Ok(response.matches)
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, VectorError> {
        let mut total = 0;
        for batch in records.chunks(UPSERT_BATCH) {
            let request = UpsertRequest {
                vectors: batch,
                namespace: self.namespace.as_deref(),
            };
            let response: UpsertResponse = self
                .post("/vectors/upsert", &request)
                .await?
                .json()
                .await
                .map_err(|e| VectorError::Response(e.to_string()))?;
            total += response.upserted_count;
        }
        info!("Upserted {} vectors into Pinecone", total);
        Ok(total)
    }
}

fn normalize_host(host: &str) -> String {
    let trimmed = host.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_gets_scheme_and_loses_trailing_slash() {
        assert_eq!(normalize_host("idx-abc.svc.pinecone.io/"), "https://idx-abc.svc.pinecone.io");
        assert_eq!(normalize_host("http://localhost:5080"), "http://localhost:5080");
    }

    #[test]
    fn query_request_uses_camel_case() {
        let request = QueryRequest {
            vector: &[0.1, 0.2],
            top_k: 3,
            include_metadata: true,
            namespace: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["topK"], 3);
        assert_eq!(json["includeMetadata"], true);
        assert!(json.get("namespace").is_none());
    }

    #[test]
    fn query_response_parses_matches() {
        let body = r#"{"matches":[{"id":"prod_7","score":0.91,"metadata":{"source":"product"}}],"namespace":""}"#;
        let parsed: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.matches[0].id, "prod_7");
        assert_eq!(parsed.matches[0].metadata["source"], "product");
    }

    #[test]
    fn requires_key_and_host() {
        assert!(PineconeIndex::new(&VectorConfig::default()).is_err());
    }
}
