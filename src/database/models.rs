use serde::{Deserialize, Serialize};

/// Who authored a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Stored rows predate the enum; anything unknown reads as assistant.
    pub fn from_db(value: &str) -> Self {
        match value {
            "user" => MessageRole::User,
            _ => MessageRole::Assistant,
        }
    }
}

/// One message of a session's ordered log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
}
