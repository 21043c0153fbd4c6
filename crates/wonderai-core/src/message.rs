//! UI-agnostic chat message types
//!
//! These structures are shared by every front end and carry no rendering
//! concerns. Timestamps are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Correlates an optimistic placeholder with the message that confirms it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingId(String);

impl PendingId {
    pub fn generate() -> Self {
        Self(format!("pending_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PendingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Map widget attached to an assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapWidget {
    pub center: Coordinates,
    pub zoom: u8,
    #[serde(default)]
    pub markers: Vec<MapMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_url: Option<String>,
}

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MapWidget>,
    pub timestamp: i64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub is_optimistic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<PendingId>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            role,
            text: text.into(),
            images: Vec::new(),
            map: None,
            timestamp,
            metadata: serde_json::Map::new(),
            is_streaming: false,
            is_optimistic: false,
            pending_id: None,
        }
    }

    pub fn user(text: impl Into<String>, timestamp: i64) -> Self {
        Self::new(ChatRole::User, text, timestamp)
    }

    pub fn assistant(text: impl Into<String>, timestamp: i64) -> Self {
        Self::new(ChatRole::Assistant, text, timestamp)
    }

    /// Locally predicted user message shown before the server confirms it.
    pub fn optimistic(text: impl Into<String>, pending_id: PendingId, timestamp: i64) -> Self {
        Self {
            is_optimistic: true,
            pending_id: Some(pending_id),
            ..Self::user(text, timestamp)
        }
    }

    /// Empty assistant reply that fills in while the stream runs.
    pub fn streaming(pending_id: PendingId, timestamp: i64) -> Self {
        Self {
            is_streaming: true,
            pending_id: Some(pending_id),
            ..Self::assistant(String::new(), timestamp)
        }
    }

    pub fn with_pending_id(mut self, pending_id: PendingId) -> Self {
        self.pending_id = Some(pending_id);
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    pub fn with_map(mut self, map: MapWidget) -> Self {
        self.map = Some(map);
        self
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimistic_message_carries_pending_id() {
        let pending = PendingId::from("p1");
        let msg = ChatMessage::optimistic("Hello", pending.clone(), 10);
        assert!(msg.is_optimistic);
        assert!(!msg.is_streaming);
        assert_eq!(msg.role, ChatRole::User);
        assert_eq!(msg.pending_id, Some(pending));
    }

    #[test]
    fn serializes_with_client_field_names() {
        let msg = ChatMessage::streaming(PendingId::from("p2"), 42);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["isStreaming"], true);
        assert_eq!(value["pendingId"], "p2");
        assert!(value.get("map").is_none());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(PendingId::generate(), PendingId::generate());
        assert_ne!(ChatMessage::user("a", 1).id, ChatMessage::user("a", 1).id);
    }
}
