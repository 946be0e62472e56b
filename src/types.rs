//! Wire schemas for the ChatApp HTTP and WebSocket endpoints.
//!
//! DESIGN
//! ======
//! Every payload crossing the network boundary has an explicit type here and
//! is decoded with `serde`, so a malformed response fails at decode time
//! instead of surfacing later as a missing field in the store. Field names
//! follow the backend's camelCase JSON.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller's role within a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

/// A single chat message, as delivered by history pages and socket frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Summary record for one chat in list views.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPreview {
    pub chat_id: String,
    pub chat_name: String,
    /// Other participant when the chat is a direct message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dm_participant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

impl ChatPreview {
    /// Timestamp used to order chats by recency.
    #[must_use]
    pub fn activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_message
            .as_ref()
            .map(|message| message.timestamp)
            .or(self.last_activity)
    }

    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.dm_participant_id.is_some()
    }

    /// Record `message` as the latest activity in this chat.
    pub fn apply_message(&mut self, message: &ChatMessage) {
        self.last_activity = Some(message.timestamp);
        self.last_message = Some(message.clone());
    }
}

/// Body of `POST /chats`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChatRequest {
    pub chat_name: String,
    pub other_users: Vec<String>,
    pub is_public: bool,
}

/// Body of `POST /login`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub remember_me: bool,
}

/// Body of `POST /signup`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

/// Query for `GET /chats/{id}`: the newest page when `start_id` is absent,
/// otherwise the page of messages before `start_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryQuery {
    pub start_id: Option<String>,
    pub count: usize,
}

impl HistoryQuery {
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(start_id) = &self.start_id {
            pairs.push(("start_id", start_id.clone()));
        }
        pairs.push(("count", self.count.to_string()));
        pairs
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutgoingKind {
    Message,
}

/// Text frame sent over a chat socket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    #[serde(rename = "type")]
    pub kind: OutgoingKind,
    pub chat_id: String,
    pub content: String,
}

impl OutgoingMessage {
    #[must_use]
    pub fn text(chat_id: &str, content: &str) -> Self {
        Self { kind: OutgoingKind::Message, chat_id: chat_id.to_owned(), content: content.to_owned() }
    }
}

/// Decode an inbound socket text frame into a message.
///
/// Some backend revisions send the message JSON wrapped in a JSON string.
/// Both shapes are accepted; the wrapped form is logged so it stays visible
/// until the backend contract is confirmed.
///
/// # Errors
///
/// Returns a decode error when the frame is not a message in either shape.
pub fn parse_socket_frame(text: &str) -> Result<ChatMessage, serde_json::Error> {
    let value = match serde_json::from_str::<Value>(text)? {
        Value::String(inner) => {
            tracing::debug!("socket frame was double-encoded JSON");
            serde_json::from_str::<Value>(&inner)?
        }
        other => other,
    };
    serde_json::from_value(value)
}
