use std::sync::Arc;

use chatrelay_agents::{
    ChatPipeline, CompletionProvider, MemoriesProvider, OpenRouterProvider, RunwareProvider,
    ToolDispatcher, ToolProvider,
};
use chatrelay_common::Result;
use chatrelay_config::AppConfig;
use chatrelay_config::loader::config_dir;
use chatrelay_db::{ChatRepository, ChatStore};
use tracing::{info, warn};

const DB_FILE: &str = "chatrelay.db";

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub repo: Arc<dyn ChatRepository>,
    pub pipeline: Arc<ChatPipeline>,
    /// Used directly for media registration, outside the dispatcher.
    pub memories: Arc<MemoriesProvider>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the pipeline from already constructed collaborators.
    pub fn new(
        config: AppConfig,
        repo: Arc<dyn ChatRepository>,
        completion: Arc<dyn CompletionProvider>,
        primary: Arc<dyn ToolProvider>,
        memories: Arc<MemoriesProvider>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(primary, memories.clone())
            .with_max_attempts(config.tools.max_attempts);
        let pipeline = ChatPipeline::new(
            repo.clone(),
            completion,
            dispatcher,
            config.completion.model.clone(),
            config.chat.system_prompt.clone(),
        )
        .with_title_max_chars(config.chat.title_max_chars);

        Self {
            config,
            repo,
            pipeline: Arc::new(pipeline),
            memories,
        }
    }

    /// Open the store and build the HTTP clients described by `config`.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let db_path = config
            .database
            .path
            .clone()
            .unwrap_or_else(|| config_dir().join(DB_FILE));
        let repo: Arc<dyn ChatRepository> = Arc::new(ChatStore::open(&db_path)?);

        let completion_config = &config.completion;
        if completion_config.api_key.is_none() {
            warn!("no completion API key configured; set OPENROUTER_API_KEY");
        }
        let completion = OpenRouterProvider::new(
            completion_config.api_key.clone().unwrap_or_default(),
            Some(completion_config.base_url.clone()),
        )
        .with_attribution(
            completion_config.referer.clone(),
            completion_config.title.clone(),
        );

        let runware = RunwareProvider::from_config(&config.tools.runware);
        let memories = MemoriesProvider::from_config(&config.tools.memories);
        info!(
            model = %completion_config.model,
            max_attempts = config.tools.max_attempts,
            "chat pipeline configured"
        );

        Ok(Self::new(
            config,
            repo,
            Arc::new(completion),
            Arc::new(runware),
            Arc::new(memories),
        ))
    }
}
