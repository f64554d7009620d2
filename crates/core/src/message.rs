//! Message and conversation-turn domain types.
//!
//! A [`ConversationTurn`] is what the chat frontend hands to the prompt
//! assembler: every message so far, the model selected for the reply and
//! the course the conversation belongs to. The assembler writes its output
//! back onto the last message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::passage::{Passage, ToolResult};

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
}

/// An image reference inside a multi-part message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One typed part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    /// An image produced by a tool call and attached to the user's message.
    ToolImageUrl { image_url: ImageUrl },
}

/// Message content: either plain text or a sequence of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// All text in this content. Text parts are joined with a newline;
    /// image parts contribute nothing.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    #[serde(default = "new_message_id")]
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// Plain text or typed parts
    pub content: MessageContent,

    /// Retrieved passages attached to this message, in rank order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<Passage>,

    /// Results of tools run on behalf of this message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolResult>,

    /// Engineered user prompt, written by the assembler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_prompt_engineered_message: Option<String>,

    /// Resolved system prompt, written by the assembler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_system_message: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    fn with_role(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            contexts: Vec::new(),
            tools: Vec::new(),
            final_prompt_engineered_message: None,
            latest_system_message: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Attach retrieved passages.
    pub fn with_contexts(mut self, contexts: Vec<Passage>) -> Self {
        self.contexts = contexts;
        self
    }

    /// Attach tool results.
    pub fn with_tools(mut self, tools: Vec<ToolResult>) -> Self {
        self.tools = tools;
        self
    }

    /// The text of this message (see [`MessageContent::text`]).
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// The model a turn will be sent to.
///
/// A `token_limit` of 0 means "not specified"; callers substitute their
/// configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model identifier (e.g., "gpt-4o")
    #[serde(default)]
    pub id: String,

    /// Context window size in tokens
    #[serde(default)]
    pub token_limit: usize,
}

/// One request's worth of conversation, as handed to the prompt assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Conversation ID
    #[serde(default)]
    pub id: ConversationId,

    /// Course (project) the conversation belongs to
    #[serde(default)]
    pub course_name: String,

    /// Target model
    #[serde(default)]
    pub model: ModelSpec,

    /// Ordered messages; the last one is being answered
    pub messages: Vec<Message>,
}

impl ConversationTurn {
    /// Create an empty turn for the given model.
    pub fn new(course_name: impl Into<String>, model: ModelSpec) -> Self {
        Self {
            id: ConversationId::new(),
            course_name: course_name.into(),
            model,
            messages: Vec::new(),
        }
    }

    /// Add a message to the turn.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("What is a flip-flop?");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "What is a flip-flop?");
        assert!(msg.contexts.is_empty());
        assert!(msg.final_prompt_engineered_message.is_none());
    }

    #[test]
    fn text_parts_are_joined_and_images_skipped() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "Explain this circuit".into(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "https://img/1.png".into(),
                },
            },
            ContentPart::Text {
                text: "in detail".into(),
            },
        ]);
        assert_eq!(content.text(), "Explain this circuit\nin detail");
    }

    #[test]
    fn image_only_content_has_empty_text() {
        let content = MessageContent::Parts(vec![ContentPart::ToolImageUrl {
            image_url: ImageUrl {
                url: "https://img/2.png".into(),
            },
        }]);
        assert_eq!(content.text(), "");
    }

    #[test]
    fn turn_deserializes_from_frontend_json() {
        let json = r#"{
            "course_name": "ece120",
            "model": {"id": "gpt-4o", "token_limit": 128000},
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": [
                    {"type": "text", "text": "what is in this image?"},
                    {"type": "image_url", "image_url": {"url": "https://img/3.png"}}
                ]}
            ]
        }"#;
        let turn: ConversationTurn = serde_json::from_str(json).unwrap();
        assert_eq!(turn.messages.len(), 3);
        assert_eq!(turn.model.token_limit, 128000);
        assert_eq!(
            turn.last_message().unwrap().text(),
            "what is in this image?"
        );
    }
}
