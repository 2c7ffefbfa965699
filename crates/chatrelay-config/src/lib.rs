pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{
    AppConfig, ChatConfig, CompletionConfig, DatabaseConfig, GatewayConfig, LoggingConfig,
    MemoriesConfig, RunwareConfig, ToolsConfig,
};
