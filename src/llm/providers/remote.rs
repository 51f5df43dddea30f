use crate::config::LlmConfig;
use crate::llm::models::ChatMessage;
use crate::llm::providers::sql_prompt;
use crate::llm::{extract_sql, ChatModel, LlmError, SqlGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// OpenAI-compatible `/chat/completions` backend.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    chat_model: String,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            LlmError::ConfigError("API URL is required for remote LLM provider".to_string())
        })?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError("API key is required for remote LLM provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
            chat_model: config.chat_model.clone(),
        })
    }

    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError> {
        let request = PromptRequest {
            model,
            messages,
            temperature,
            max_tokens: 2000,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("LLM API responded with status code: {} - {}", status, body);
            return Err(LlmError::ResponseError(format!(
                "API responded with status code: {}",
                status
            )));
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        prompt_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))
    }
}

#[async_trait]
impl SqlGenerator for RemoteLlmProvider {
    async fn generate_sql(&self, question: &str, schema: &str, top_k: usize) -> Result<String, LlmError> {
        let prompt = sql_prompt(question, schema, top_k);
        let content = self.send(&self.model, &[ChatMessage::user(prompt)], 0.0).await?;
        debug!("Raw SQL completion: {}", content);
        Ok(extract_sql(&content))
    }
}

#[async_trait]
impl ChatModel for RemoteLlmProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.send(&self.chat_model, messages, 0.7).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::Role;

    #[test]
    fn requires_api_key() {
        let config = LlmConfig {
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(matches!(
            RemoteLlmProvider::new(&config),
            Err(LlmError::ConfigError(_))
        ));
    }

    #[test]
    fn request_serializes_roles_in_lowercase() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let request = PromptRequest {
            model: "gpt-4.1",
            messages: &messages,
            temperature: 0.0,
            max_tokens: 10,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(messages[1].role, Role::User);
    }
}
