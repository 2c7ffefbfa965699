use chatrelay_common::{ConversationId, MediaRef, Result, Role};
use chatrelay_db::ChatRepository;
use std::sync::Arc;

use crate::providers::ChatMessage;

/// Model input for one turn, plus the media it was built from.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// System message followed by the full history in ascending order.
    pub messages: Vec<ChatMessage>,
    /// Media attached to the conversation, oldest first.
    pub media: Vec<MediaRef>,
}

impl AssembledContext {
    /// Number of persisted messages, excluding the system message.
    pub fn history_len(&self) -> usize {
        self.messages.len().saturating_sub(1)
    }
}

/// Builds the model input for a conversation from persisted state.
#[derive(Clone)]
pub struct ContextAssembler {
    repo: Arc<dyn ChatRepository>,
    system_prompt: String,
}

impl ContextAssembler {
    pub fn new(repo: Arc<dyn ChatRepository>, system_prompt: impl Into<String>) -> Self {
        Self {
            repo,
            system_prompt: system_prompt.into(),
        }
    }

    pub async fn build(&self, conversation_id: &ConversationId) -> Result<AssembledContext> {
        let media = self.repo.list_media_for_conversation(conversation_id).await?;
        let history = self.repo.list_messages(conversation_id).await?;

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::new(
            Role::System,
            build_system_prompt(&self.system_prompt, &media),
        ));
        messages.extend(
            history
                .into_iter()
                .map(|m| ChatMessage::new(m.role, m.content)),
        );

        Ok(AssembledContext { messages, media })
    }
}

/// Base instructions, followed by the known-state media list when there is one.
pub fn build_system_prompt(base: &str, media: &[MediaRef]) -> String {
    let listed: Vec<String> = media
        .iter()
        .filter(|m| m.state.is_known())
        .enumerate()
        .map(|(i, m)| format!("{}. {} (ID: {}, {})", i + 1, m.name, m.id, m.state.as_str()))
        .collect();

    if listed.is_empty() {
        return base.to_string();
    }
    format!(
        "{base}\n\nVideos uploaded to this conversation:\n{}\nRefer to a video by its ID when the user asks about it. Videos that are still processing cannot be queried yet.",
        listed.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_common::{MediaState, UserId};
    use chatrelay_db::ChatStore;
    use chrono::{Duration, Utc};

    fn media(id: &str, state: MediaState) -> MediaRef {
        MediaRef {
            id: id.into(),
            name: format!("{id}.mp4"),
            state,
        }
    }

    #[test]
    fn system_prompt_without_media_is_base() {
        assert_eq!(build_system_prompt("Be brief.", &[]), "Be brief.");
    }

    #[test]
    fn system_prompt_lists_known_media_with_labels() {
        let prompt = build_system_prompt(
            "Be brief.",
            &[
                media("VI1", MediaState::Ready),
                media("VI2", MediaState::Unknown),
                media("VI3", MediaState::Processing),
            ],
        );
        assert!(prompt.starts_with("Be brief.\n\n"));
        assert!(prompt.contains("1. VI1.mp4 (ID: VI1, ready)"));
        assert!(prompt.contains("2. VI3.mp4 (ID: VI3, processing)"));
        assert!(!prompt.contains("VI2"));
    }

    #[tokio::test]
    async fn build_puts_system_first_then_history_in_order() {
        let store = Arc::new(ChatStore::in_memory().unwrap());
        let owner = UserId::from("u1");
        let conversation = store.create_conversation(&owner, None).await.unwrap();
        let start = Utc::now();
        store
            .insert_message(&conversation.id, Role::User, "hello", start)
            .await
            .unwrap();
        store
            .insert_message(
                &conversation.id,
                Role::Assistant,
                "hi there",
                start + Duration::seconds(1),
            )
            .await
            .unwrap();
        store
            .add_media(&conversation.id, &media("VI9", MediaState::Ready))
            .await
            .unwrap();

        let assembler = ContextAssembler::new(store, "Be brief.");
        let context = assembler.build(&conversation.id).await.unwrap();

        assert_eq!(context.history_len(), 2);
        assert_eq!(context.messages[0].role, Role::System);
        assert!(context.messages[0].content.contains("VI9"));
        assert_eq!(context.messages[1], ChatMessage::new(Role::User, "hello"));
        assert_eq!(context.messages[2], ChatMessage::new(Role::Assistant, "hi there"));
        assert_eq!(context.media.len(), 1);
    }
}
