//! Question routing, answer formatting and conversation history.

pub mod classifier;
pub mod fallback;
pub mod format;
pub mod history;
pub mod literal;
pub mod rows;
pub mod semantic;
pub mod similarity;
pub mod sql_agent;
pub mod summary;
pub mod table_image;

use classifier::QuestionClassifier;
use fallback::Fallback;
use format::{extract_limit_from_question, extract_table_sentinel, format_result};
use history::HistoryRecorder;
use semantic::SemanticSearch;
use sql_agent::SqlAgent;
use summary::{conversation_prompt, history_prompt, ConversationMessage, NO_HISTORY};
use table_image::TableRenderer;
use tracing::{info, warn};

pub const EMPTY_QUESTION: &str = "Please type a question.";

/// Everything the chat service routes between.
pub struct ChatParts {
    pub classifier: QuestionClassifier,
    pub sql: SqlAgent,
    pub semantic: SemanticSearch,
    pub renderer: TableRenderer,
    pub fallback: Fallback,
    pub history: HistoryRecorder,
    pub semantic_top_k: usize,
    pub recent_limit: usize,
}

pub struct ChatService {
    classifier: QuestionClassifier,
    sql: SqlAgent,
    semantic: SemanticSearch,
    renderer: TableRenderer,
    fallback: Fallback,
    history: HistoryRecorder,
    semantic_top_k: usize,
    recent_limit: usize,
}

impl ChatService {
    pub fn new(parts: ChatParts) -> Self {
        Self {
            classifier: parts.classifier,
            sql: parts.sql,
            semantic: parts.semantic,
            renderer: parts.renderer,
            fallback: parts.fallback,
            history: parts.history,
            semantic_top_k: parts.semantic_top_k,
            recent_limit: parts.recent_limit,
        }
    }

    /// Answers a question. Pipeline failures are replaced by the fallback reply,
    /// so this always produces text.
    pub async fn handle_query(&self, text: &str) -> String {
        let question = text.trim();
        if question.is_empty() {
            return EMPTY_QUESTION.to_string();
        }

        let reply = if self.classifier.is_data_question(question) {
            info!("Routing to SQL pipeline: {:?}", question);
            match self.sql.query_via_sqlagent(question).await {
                Ok(rows) => format_result(&rows, &self.renderer, extract_limit_from_question(question)),
                Err(e) => {
                    warn!("Data-centric error: {}", e);
                    self.fallback.call_llm_fallback(question).await
                }
            }
        } else {
            info!("Routing to semantic search: {:?}", question);
            match self
                .semantic
                .handle_semantic_search(question, self.semantic_top_k)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Semantic-search error: {}", e);
                    self.fallback.call_llm_fallback(question).await
                }
            }
        };

        self.history.record_interaction(question, &reply, None).await;
        reply
    }

    /// Lays out rows with the same rules as answers, without recording anything.
    pub fn format_rows(&self, rows: &[rows::ResultRow]) -> String {
        format_result(rows, &self.renderer, None)
    }

    pub async fn clear_history(&self) {
        self.history.clear().await;
    }

    pub async fn summarize_history(&self) -> String {
        let entries = self.history.load_recent_history(self.recent_limit).await;
        if entries.is_empty() {
            return NO_HISTORY.to_string();
        }
        self.fallback
            .complete_or_apologise(&history_prompt(&entries))
            .await
    }

    pub async fn summarize_conversation(
        &self,
        history: &[ConversationMessage],
        visuals: &[String],
    ) -> String {
        if history.iter().all(|m| m.text.trim().is_empty()) {
            return NO_HISTORY.to_string();
        }
        // Table images already shown in replies count as visuals too.
        let mut visuals = visuals.to_vec();
        for table in history.iter().filter_map(|m| extract_table_sentinel(&m.text)) {
            if !visuals.contains(&table) {
                visuals.push(table);
            }
        }
        self.fallback
            .complete_or_apologise(&conversation_prompt(history, &visuals))
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DEFAULT_KEYWORDS;
    use crate::db::warehouse::tests::seeded_warehouse;
    use crate::embedding::{Embedder, EmbeddingError};
    use crate::vector::MemoryVectorIndex;
    use fallback::tests::CannedChat;
    use fallback::APOLOGY;
    use semantic::tests::ConstantEmbedder;
    use semantic::NO_MATCHES;
    use similarity::ReferenceQuestions;
    use sql_agent::tests::ScriptedChain;
    use sql_agent::SqlChain;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Request("connection refused".to_string()))
        }

        async fn embed_batch(&self, _: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Request("connection refused".to_string()))
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    pub(crate) struct Fixture {
        pub(crate) dir: TempDir,
        pub(crate) service: ChatService,
    }

    pub(crate) async fn service_with(
        chain: Arc<dyn SqlChain>,
        embedder: Arc<dyn Embedder>,
        chat_reply: Option<&str>,
    ) -> Fixture {
        let (dir, warehouse) = seeded_warehouse().await;
        let service = ChatService::new(ChatParts {
            classifier: QuestionClassifier::new(
                DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
                ReferenceQuestions::default(),
                0.5,
            ),
            sql: SqlAgent::new(chain),
            semantic: SemanticSearch::new(
                embedder,
                Arc::new(MemoryVectorIndex::new()),
                Arc::new(warehouse.clone()),
                2,
            ),
            renderer: TableRenderer::new(dir.path().join("charts")).unwrap(),
            fallback: Fallback::new(Arc::new(CannedChat::new(chat_reply)), Some(warehouse)),
            history: HistoryRecorder::new(dir.path().join("chatbot_responses.json")),
            semantic_top_k: 3,
            recent_limit: 10,
        });
        Fixture { dir, service }
    }

    #[tokio::test]
    async fn data_question_gets_numbered_list_and_is_recorded() {
        let chain = Arc::new(ScriptedChain::new(vec![ScriptedChain::output(
            &["product_name", "product_category", "profit"],
            "[('Desk Lamp', 'Home', 1500.0), ('Chair', 'Office', 1234.56), ('Mug', 'Kitchen', 180.0)]",
        )]));
        let fx = service_with(chain, Arc::new(ConstantEmbedder(vec![1.0, 0.0])), None).await;

        let reply = fx.service.handle_query("Top 3 products by profit").await;
        let lines: Vec<&str> = reply.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "1. Desk Lamp (Home) — 1,500.00  ");
        assert_eq!(lines[1], "2. Chair (Office) — 1,234.56  ");

        let history = fx.service.history.load_recent_history(5).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query_text, "Top 3 products by profit");
        assert_eq!(history[0].retrieved_response, reply);
    }

    #[tokio::test]
    async fn general_question_with_no_matches() {
        let chain = Arc::new(ScriptedChain::new(vec![]));
        let fx = service_with(chain.clone(), Arc::new(ConstantEmbedder(vec![1.0, 0.0])), None).await;

        let reply = fx.service.handle_query("How do I reset my password?").await;
        assert_eq!(reply, NO_MATCHES);
        assert!(chain.questions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_question_is_rejected_without_recording() {
        let fx = service_with(
            Arc::new(ScriptedChain::new(vec![])),
            Arc::new(ConstantEmbedder(vec![1.0])),
            None,
        )
        .await;
        assert_eq!(fx.service.handle_query("   ").await, EMPTY_QUESTION);
        assert!(!fx.dir.path().join("chatbot_responses.json").exists());
    }

    #[tokio::test]
    async fn pipeline_failures_use_fallback() {
        let fx = service_with(
            Arc::new(ScriptedChain::new(vec![])),
            Arc::new(BrokenEmbedder),
            Some("Here is a general answer."),
        )
        .await;
        assert_eq!(fx.service.handle_query("list products").await, "Here is a general answer.");
        assert_eq!(fx.service.handle_query("hello there").await, "Here is a general answer.");
        assert_eq!(fx.service.history.load_recent_history(10).await.len(), 2);

        let offline = service_with(Arc::new(ScriptedChain::new(vec![])), Arc::new(BrokenEmbedder), None).await;
        assert_eq!(offline.service.handle_query("hello there").await, APOLOGY);
    }

    #[tokio::test]
    async fn summaries_need_history() {
        let fx = service_with(
            Arc::new(ScriptedChain::new(vec![])),
            Arc::new(ConstantEmbedder(vec![1.0, 0.0])),
            Some("You asked about passwords."),
        )
        .await;
        assert_eq!(fx.service.summarize_history().await, NO_HISTORY);
        assert_eq!(fx.service.summarize_conversation(&[], &[]).await, NO_HISTORY);

        fx.service.handle_query("How do I reset my password?").await;
        assert_eq!(fx.service.summarize_history().await, "You asked about passwords.");

        fx.service.clear_history().await;
        assert_eq!(fx.service.summarize_history().await, NO_HISTORY);
    }

    #[tokio::test]
    async fn conversation_summary_lists_rendered_tables() {
        let chat = Arc::new(CannedChat::new(Some("You looked at sales.")));
        let (_dir, warehouse) = seeded_warehouse().await;
        let mut fx = service_with(
            Arc::new(ScriptedChain::new(vec![])),
            Arc::new(ConstantEmbedder(vec![1.0, 0.0])),
            None,
        )
        .await;
        fx.service.fallback = Fallback::new(chat.clone(), Some(warehouse));

        let history = vec![
            ConversationMessage {
                sender: "user".into(),
                text: "all sales by month".into(),
            },
            ConversationMessage {
                sender: "bot".into(),
                text: "TABLE:charts/table_1.svg".into(),
            },
        ];
        let reply = fx
            .service
            .summarize_conversation(&history, &["TABLE:charts/table_1.svg".to_string()])
            .await;
        assert_eq!(reply, "You looked at sales.");

        let seen = chat.seen.lock().unwrap();
        let prompt = &seen[0][1].content;
        assert_eq!(prompt.matches("- TABLE:charts/table_1.svg").count(), 1);
    }
}
