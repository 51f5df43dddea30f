pub mod models;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use models::ChatMessage;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(&self, question: &str, schema: &str, top_k: usize) -> Result<String, LlmError>;
}

/// Free-text completion used by the fallback and summary paths.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

pub struct LlmManager {
    generator: Arc<dyn SqlGenerator>,
    chat: Arc<dyn ChatModel>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        match config.backend.as_str() {
            "remote" => {
                let provider = Arc::new(providers::remote::RemoteLlmProvider::new(config)?);
                Ok(Self::from_parts(provider.clone(), provider))
            }
            "ollama" => {
                let provider = Arc::new(providers::ollama::OllamaProvider::new(config)?);
                Ok(Self::from_parts(provider.clone(), provider))
            }
            _ => Err(LlmError::ConfigError(format!(
                "Unsupported LLM backend: {}",
                config.backend
            ))),
        }
    }

    pub fn from_parts(generator: Arc<dyn SqlGenerator>, chat: Arc<dyn ChatModel>) -> Self {
        Self { generator, chat }
    }

    pub fn sql_generator(&self) -> Arc<dyn SqlGenerator> {
        Arc::clone(&self.generator)
    }

    pub fn chat_model(&self) -> Arc<dyn ChatModel> {
        Arc::clone(&self.chat)
    }
}

/// Pulls the SQL statement out of a model reply: a fenced block if present,
/// otherwise the first line starting with a SQL keyword up to the next `;`.
pub fn extract_sql(content: &str) -> String {
    if let Some(start) = content.find("```sql") {
        let after = &content[start + 6..];
        let end = after.find("```").unwrap_or(after.len());
        return after[..end].trim().to_string();
    }

    if let Some(sql) = scan_sql_lines(content) {
        return sql;
    }

    if let Some(start) = content.find("```") {
        let after = &content[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    content.trim().to_string()
}

/// First line starting with SELECT or WITH, joined with its continuation lines
/// up to a `;` or a closing fence.
fn scan_sql_lines(content: &str) -> Option<String> {
    let sql_keywords = ["SELECT", "WITH"];
    let lines: Vec<&str> = content.lines().collect();

    let (i, line) = lines.iter().enumerate().find(|(_, line)| {
        let trimmed = line.trim().to_uppercase();
        sql_keywords.iter().any(|kw| trimmed.starts_with(kw))
    })?;

    let mut sql = line.trim().to_string();
    if sql.ends_with(';') {
        return Some(sql);
    }
    for next in &lines[i + 1..] {
        let next_line = next.trim();
        if next_line.starts_with("```") {
            break;
        }
        sql.push(' ');
        sql.push_str(next_line);
        if next_line.ends_with(';') {
            break;
        }
    }
    Some(sql)
}
