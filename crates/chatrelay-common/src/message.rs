use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: UserId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// A persisted chat message. Immutable once created; history is ordered by `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Processing state of an uploaded media item as reported by the analysis backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaState {
    Processing,
    Ready,
    Failed,
    Unknown,
}

impl MediaState {
    /// Map a backend status string onto a state. The analysis backend reports
    /// `UNPARSE` while indexing and `PARSE` once a video can be queried.
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "PARSE" | "READY" | "DONE" | "COMPLETED" => MediaState::Ready,
            "UNPARSE" | "PROCESSING" | "PENDING" | "UPLOADING" => MediaState::Processing,
            "FAILED" | "FAIL" | "ERROR" => MediaState::Failed,
            _ => MediaState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaState::Processing => "processing",
            MediaState::Ready => "ready",
            MediaState::Failed => "failed",
            MediaState::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MediaState::Unknown)
    }
}

/// A media item previously uploaded into a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    /// Stable identifier assigned by the analysis backend (e.g. `VI5681...`).
    pub id: String,
    pub name: String,
    pub state: MediaState,
}
