use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

// One message of a chat-completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Flattens a message list into one prompt for completion-style backends.
pub fn flatten_messages(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        let label = match message.role {
            Role::System => "### System",
            Role::User => "### User",
            Role::Assistant => "### Assistant",
        };
        prompt.push_str(label);
        prompt.push('\n');
        prompt.push_str(&message.content);
        prompt.push_str("\n\n");
    }
    prompt.push_str("### Assistant\n");
    prompt
}
