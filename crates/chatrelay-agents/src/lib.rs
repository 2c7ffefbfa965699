pub mod classifier;
pub mod context;
pub mod dispatcher;
pub mod openrouter;
pub mod pipeline;
pub mod providers;
pub mod tools;

pub use classifier::{Domain, Rule, RULES, classify, inject_media};
pub use context::{AssembledContext, ContextAssembler};
pub use dispatcher::{ToolDispatcher, format_result};
pub use openrouter::{OpenRouterProvider, SseLineDecoder, relay_bytes};
pub use pipeline::{ChatPipeline, SendRequest, derive_title};
pub use providers::{ChatMessage, CompletionProvider, CompletionRequest, TextStream};
pub use tools::{
    Backend, MemoriesProvider, Platform, RunwareProvider, SummaryKind, ToolArgs, ToolDefinition,
    ToolProvider, ToolSelection,
};
