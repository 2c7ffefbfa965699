use std::path::{Path, PathBuf};

use chatrelay_common::{Error, Result};
use tracing::{info, warn};

use crate::model::AppConfig;

const CONFIG_DIR: &str = ".chatrelay";
const CONFIG_FILE: &str = "config.yml";

/// Loads `AppConfig` from YAML and layers environment overrides on top.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.unwrap_or_else(default_config_path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config file (defaults when absent), then apply `.env` and process
    /// environment overrides.
    pub fn load(&self) -> Result<AppConfig> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                warn!("failed to read .env file: {e}");
            }
        }

        let mut config = if self.path.exists() {
            info!("loading config from {}", self.path.display());
            let raw = std::fs::read_to_string(&self.path)?;
            parse_yaml(&raw)?
        } else {
            info!(
                "no config file at {}, using defaults",
                self.path.display()
            );
            AppConfig::default()
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(CONFIG_DIR))
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR))
}

pub fn parse_yaml(raw: &str) -> Result<AppConfig> {
    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(raw).map_err(|e| Error::Config(format!("invalid config file: {e}")))
}

/// Apply environment overrides using `lookup` as the variable source.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(key) = lookup("OPENROUTER_API_KEY") {
        config.completion.api_key = Some(key);
    }
    if let Some(key) = lookup("RUNWARE_API_KEY") {
        config.tools.runware.api_key = Some(key);
    }
    if let Some(key) = lookup("MEMORIES_API_KEY") {
        config.tools.memories.api_key = Some(key);
    }
    if let Some(path) = lookup("CHATRELAY_DB_PATH") {
        config.database.path = Some(PathBuf::from(path));
    }
    if let Some(port) = lookup("CHATRELAY_PORT") {
        match port.parse() {
            Ok(port) => config.gateway.port = port,
            Err(_) => warn!("ignoring invalid CHATRELAY_PORT value '{port}'"),
        }
    }
}
