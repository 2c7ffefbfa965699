use async_trait::async_trait;
use chatrelay_common::{Conversation, ConversationId, MediaRef, Message, MessageId, Result, Role, UserId};
use chrono::{DateTime, Utc};

/// Storage contract used by the chat pipeline and the HTTP routes.
///
/// Implementations perform plain read-then-write sequences; there is no
/// transactional isolation between concurrent sends into one conversation.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// True when `id` exists and is owned by `owner`.
    async fn find_conversation(&self, id: &ConversationId, owner: &UserId) -> Result<bool>;

    async fn insert_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageId>;

    async fn touch_conversation(
        &self,
        conversation_id: &ConversationId,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_title(&self, conversation_id: &ConversationId, title: &str) -> Result<()>;

    /// All messages of a conversation in ascending creation order.
    async fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>>;

    async fn list_media_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<MediaRef>>;

    async fn create_conversation(&self, owner: &UserId, title: Option<&str>)
    -> Result<Conversation>;

    /// Conversations of `owner`, most recently updated first.
    async fn list_conversations(&self, owner: &UserId) -> Result<Vec<Conversation>>;

    async fn get_conversation(
        &self,
        id: &ConversationId,
        owner: &UserId,
    ) -> Result<Option<Conversation>>;

    /// Returns false when nothing matched.
    async fn delete_conversation(&self, id: &ConversationId, owner: &UserId) -> Result<bool>;

    async fn add_media(&self, conversation_id: &ConversationId, media: &MediaRef) -> Result<()>;
}
