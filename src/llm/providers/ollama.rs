use crate::config::LlmConfig;
use crate::llm::models::{flatten_messages, ChatMessage};
use crate::llm::providers::sql_prompt;
use crate::llm::{extract_sql, ChatModel, LlmError, SqlGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
    chat_model: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        // The remote default points at OpenAI; only honour URLs that look like Ollama
        let api_url = config
            .api_url
            .clone()
            .filter(|url| url.contains("/api/generate"))
            .unwrap_or_else(|| "http://localhost:11434/api/generate".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            model: config.model.clone(),
            chat_model: config.chat_model.clone(),
        })
    }

    async fn generate(&self, model: &str, prompt: String, temperature: f32) -> Result<String, LlmError> {
        info!("Sending request to Ollama with model: {}", model);
        debug!("API URL: {}", self.api_url);

        let request = OllamaRequest {
            model,
            prompt,
            stream: false,
            options: OllamaOptions { temperature },
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Ollama API responded with status code: {}{}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Ollama API responded with status code: {}{}",
                status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Ollama: {}", response_text);

        let ollama_response = serde_json::from_str::<OllamaResponse>(&response_text).map_err(|e| {
            error!("Failed to parse Ollama response: {} - Response was: {}", e, response_text);
            LlmError::ResponseError(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(ollama_response.response)
    }
}

#[async_trait]
impl SqlGenerator for OllamaProvider {
    async fn generate_sql(&self, question: &str, schema: &str, top_k: usize) -> Result<String, LlmError> {
        let prompt = sql_prompt(question, schema, top_k);
        let content = self.generate(&self.model, prompt, 0.1).await?;
        let sql = extract_sql(&content);

        if sql.trim().is_empty() {
            return Err(LlmError::ResponseError(
                "Failed to extract valid SQL from response".to_string(),
            ));
        }

        Ok(sql)
    }
}

#[async_trait]
impl ChatModel for OllamaProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.generate(&self.chat_model, flatten_messages(messages), 0.7).await
    }
}
