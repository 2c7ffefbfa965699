pub mod error;
pub mod event;
pub mod message;
pub mod types;

pub use error::{Error, Result};
pub use event::StreamEvent;
pub use message::{Conversation, MediaRef, MediaState, Message, Role};
pub use types::{ConversationId, MessageId, UserId};
