use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_COMPLETION_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Stay on topic, answer the \
user's latest message directly and keep responses concise.";

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub completion: CompletionConfig,
    pub tools: ToolsConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("gateway", &self.gateway)
            .field("database", &self.database)
            .field("completion", &self.completion)
            .field("tools", &self.tools)
            .field("chat", &self.chat)
            .field("logging", &self.logging)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// When set, requests must carry `Authorization: Bearer <api_key>`.
    pub api_key: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3888,
            api_key: None,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &mask(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Defaults to `~/.chatrelay/chatrelay.db`.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub referer: Option<String>,
    pub title: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            referer: None,
            title: Some("chatrelay".to_string()),
        }
    }
}

impl fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask(&self.api_key))
            .field("model", &self.model)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Upper bound on attempts per tool dispatch, including the first.
    pub max_attempts: u32,
    pub runware: RunwareConfig,
    pub memories: MemoriesConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            runware: RunwareConfig::default(),
            memories: MemoriesConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunwareConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for RunwareConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.runware.ai/v1".to_string(),
            api_key: None,
            poll_interval_secs: 2,
            timeout_secs: 300,
        }
    }
}

impl fmt::Debug for RunwareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunwareConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask(&self.api_key))
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoriesConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Workspace identifier sent as `unique_id` on every call.
    pub unique_id: String,
}

impl Default for MemoriesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.memories.ai/serve/api/v1".to_string(),
            api_key: None,
            unique_id: "default".to_string(),
        }
    }
}

impl fmt::Debug for MemoriesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoriesConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask(&self.api_key))
            .field("unique_id", &self.unique_id)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub system_prompt: String,
    pub title_max_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            title_max_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}

fn mask(secret: &Option<String>) -> &'static str {
    match secret {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.gateway.port, 3888);
        assert_eq!(config.tools.max_attempts, 3);
        assert_eq!(config.completion.model, DEFAULT_COMPLETION_MODEL);
        assert_eq!(config.chat.title_max_chars, 50);
        assert_eq!(config.tools.runware.poll_interval_secs, 2);
    }

    #[test]
    fn debug_output_hides_api_keys() {
        let mut config = AppConfig::default();
        config.completion.api_key = Some("sk-or-very-secret".into());
        config.tools.runware.api_key = Some("rw-secret".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("rw-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
