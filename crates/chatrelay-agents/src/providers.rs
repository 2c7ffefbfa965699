use async_trait::async_trait;
use chatrelay_common::{Result, Role};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Lazy, finite sequence of decoded text fragments from a completion backend.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Trait for streaming text-completion backends.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider identifier (e.g. "openrouter").
    fn provider_id(&self) -> &str;

    /// Issue one streaming request and return the fragment stream.
    async fn stream_completion(&self, request: &CompletionRequest) -> Result<TextStream>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}
