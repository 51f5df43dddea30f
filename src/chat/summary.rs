//! Prompts for summarising past conversation.

use super::history::HistoryEntry;
use crate::llm::models::ChatMessage;
use serde::Deserialize;

pub const NO_HISTORY: &str = "No conversation history yet.";

const SUMMARY_PROMPT: &str = "You summarise a small-business owner's conversation with their data assistant. \
Write three to five short sentences covering what they asked and the key figures they were given.";

/// One message of a client-side conversation transcript.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationMessage {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub text: String,
}

pub fn history_prompt(entries: &[HistoryEntry]) -> Vec<ChatMessage> {
    let transcript = entries
        .iter()
        .map(|e| format!("User: {}\nAssistant: {}", e.query_text, e.retrieved_response))
        .collect::<Vec<_>>()
        .join("\n\n");
    vec![ChatMessage::system(SUMMARY_PROMPT), ChatMessage::user(transcript)]
}

pub fn conversation_prompt(history: &[ConversationMessage], visuals: &[String]) -> Vec<ChatMessage> {
    let mut transcript = history
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| {
            let sender = if m.sender.is_empty() { "user" } else { m.sender.as_str() };
            format!("{}: {}", sender, m.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n");

    if !visuals.is_empty() {
        transcript.push_str("\n\nVisuals shown:\n");
        transcript.push_str(
            &visuals
                .iter()
                .map(|v| format!("- {}", v))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }
    vec![ChatMessage::system(SUMMARY_PROMPT), ChatMessage::user(transcript)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_prompt_lists_messages_and_visuals() {
        let history = vec![
            ConversationMessage {
                sender: "user".into(),
                text: "top products".into(),
            },
            ConversationMessage {
                sender: "bot".into(),
                text: "  ".into(),
            },
            ConversationMessage {
                sender: "bot".into(),
                text: "1. Lamp".into(),
            },
        ];
        let prompt = conversation_prompt(&history, &["bar chart of profit".to_string()]);
        assert_eq!(prompt.len(), 2);
        assert_eq!(
            prompt[1].content,
            "user: top products\nbot: 1. Lamp\n\nVisuals shown:\n- bar chart of profit"
        );
    }
}
