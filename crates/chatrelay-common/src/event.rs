use serde::{Deserialize, Serialize};

/// One event on the outbound chat stream. Exactly one `Done` terminates a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Chunk {
        content: String,
    },
    ToolCall {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Done {
        #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
}

impl StreamEvent {
    pub fn chunk(content: impl Into<String>) -> Self {
        StreamEvent::Chunk {
            content: content.into(),
        }
    }

    pub fn done(message_id: Option<String>) -> Self {
        StreamEvent::Done { message_id }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done { .. })
    }

    /// Text carried by the event, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            StreamEvent::Chunk { content } => Some(content),
            StreamEvent::ToolCall { content, .. } => content.as_deref(),
            StreamEvent::Done { .. } => None,
        }
    }
}
