pub mod chat_store;
pub mod repository;

pub use chat_store::ChatStore;
pub use repository::ChatRepository;
