use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    /// Failure talking to the text-completion backend.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Failure reported by a tool provider.
    #[error("tool error: {0}")]
    Tool(String),

    #[error("invalid tool arguments: {0}")]
    Validation(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
