use crate::db::warehouse::{render_table_summary, Warehouse};
use crate::llm::models::ChatMessage;
use crate::llm::ChatModel;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, warn};

pub const APOLOGY: &str = "Sorry, I’m having trouble right now. Please try again later.";
const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Answers directly from the chat model when a data pipeline fails.
pub struct Fallback {
    chat: Arc<dyn ChatModel>,
    warehouse: Option<Warehouse>,
    dataset_summary: OnceCell<Option<String>>,
}

impl Fallback {
    pub fn new(chat: Arc<dyn ChatModel>, warehouse: Option<Warehouse>) -> Self {
        Self {
            chat,
            warehouse,
            dataset_summary: OnceCell::new(),
        }
    }

    /// Table row counts, computed once per process.
    async fn dataset_summary(&self) -> Option<&str> {
        self.dataset_summary
            .get_or_init(|| async {
                let warehouse = self.warehouse.as_ref()?;
                match warehouse.summarize_tables().await {
                    Ok(tables) if !tables.is_empty() => Some(render_table_summary(&tables)),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Could not summarise dataset for fallback: {}", e);
                        None
                    }
                }
            })
            .await
            .as_deref()
    }

    pub async fn call_llm_fallback(&self, question: &str) -> String {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        if let Some(summary) = self.dataset_summary().await {
            messages.push(ChatMessage::system(format!(
                "The user's database has these tables:\n{}",
                summary
            )));
        }
        messages.push(ChatMessage::user(question));
        self.complete_or_apologise(&messages).await
    }

    pub(crate) async fn complete_or_apologise(&self, messages: &[ChatMessage]) -> String {
        match self.chat.complete(messages).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => {
                warn!("Chat model returned an empty reply");
                APOLOGY.to_string()
            }
            Err(e) => {
                error!("Chat model fallback error: {}", e);
                APOLOGY.to_string()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::warehouse::tests::seeded_warehouse;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a fixed reply (or an error when `None`) and keeps the prompts it saw.
    pub(crate) struct CannedChat {
        reply: Option<String>,
        pub(crate) seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl CannedChat {
        pub(crate) fn new(reply: Option<&str>) -> Self {
            Self {
                reply: reply.map(str::to_string),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for CannedChat {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.reply
                .clone()
                .ok_or_else(|| LlmError::ConnectionError("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn reply_is_trimmed_and_prompt_carries_dataset_summary() {
        let (_dir, warehouse) = seeded_warehouse().await;
        let chat = Arc::new(CannedChat::new(Some("  Try the settings page.\n")));
        let fallback = Fallback::new(chat.clone(), Some(warehouse));

        let reply = fallback.call_llm_fallback("How do I reset my password?").await;
        assert_eq!(reply, "Try the settings page.");

        let seen = chat.seen.lock().unwrap();
        assert_eq!(seen[0][0].content, SYSTEM_PROMPT);
        assert!(seen[0][1].content.contains("products: 2 rows"));
        assert_eq!(seen[0].last().unwrap().content, "How do I reset my password?");
    }

    #[tokio::test]
    async fn failures_become_the_apology() {
        let fallback = Fallback::new(Arc::new(CannedChat::new(None)), None);
        assert_eq!(fallback.call_llm_fallback("hi").await, APOLOGY);

        let empty = Fallback::new(Arc::new(CannedChat::new(Some("   "))), None);
        assert_eq!(empty.call_llm_fallback("hi").await, APOLOGY);
    }
}
