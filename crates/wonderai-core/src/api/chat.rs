use serde::{Deserialize, Serialize};

use crate::client::ChatClient;
use crate::error::Result;
use crate::message::{ChatMessage, ChatRole};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub message_count: u32,
}

fn default_title() -> String {
    "New Conversation".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct NewConversation {
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessage {
    pub content: String,
    pub message_type: String,
}

impl SendMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: "text".to_string(),
        }
    }
}

/// Assistant reply attached to a non-streaming send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub tokens_used: Option<u32>,
}

/// A message as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub content: String,
    pub role: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub tokens_used: Option<u32>,
    #[serde(default)]
    pub meta_data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub ai_response: Option<AiResponse>,
}

impl ServerMessage {
    /// Convert into a store message. System messages have no place in the
    /// chat view and yield `None`.
    pub fn to_chat_message(&self, fallback_timestamp: i64) -> Option<ChatMessage> {
        let role = match self.role.as_str() {
            "user" => ChatRole::User,
            "assistant" => ChatRole::Assistant,
            _ => return None,
        };
        let timestamp = self
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(fallback_timestamp);
        let mut message = ChatMessage::new(role, self.content.clone(), timestamp);
        message.id = self.id.clone();
        if let Some(meta) = &self.meta_data {
            message.metadata = meta.clone();
        }
        Some(message)
    }
}

/// The backend emits both RFC 3339 and naive UTC timestamps.
fn parse_timestamp(raw: &str) -> Option<i64> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

impl ChatClient {
    pub async fn create_conversation(&self, user_id: &str, title: &str) -> Result<Conversation> {
        let url = self.endpoint(&["api", "chat", "conversations"])?;
        let body = NewConversation {
            title: title.to_string(),
        };
        self.post_json_once(url, &[("user_id", user_id.to_string())], &body)
            .await
    }

    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>> {
        let url = self.endpoint(&["api", "chat", "conversations"])?;
        self.get_json(
            url,
            &[
                ("user_id", user_id.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .await
    }

    pub async fn get_conversation(&self, user_id: &str, conversation_id: &str) -> Result<Conversation> {
        let url = self.endpoint(&["api", "chat", "conversations", conversation_id])?;
        self.get_json(url, &[("user_id", user_id.to_string())]).await
    }

    pub async fn list_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ServerMessage>> {
        let url = self.endpoint(&["api", "chat", "conversations", conversation_id, "messages"])?;
        self.get_json(
            url,
            &[
                ("user_id", user_id.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .await
    }

    /// Non-streaming send. Some backends answer inline via `ai_response`.
    pub async fn send_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<ServerMessage> {
        let url = self.endpoint(&["api", "chat", "conversations", conversation_id, "messages"])?;
        self.post_json_once(
            url,
            &[("user_id", user_id.to_string())],
            &SendMessage::text(content),
        )
        .await
    }
}
