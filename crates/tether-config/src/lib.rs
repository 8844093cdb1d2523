//! Multi-tier TOML configuration for Tether.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > `~/.tether/config.toml` > defaults

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tether_mcp::{McpConfig, ServerConfig, ServerDescriptor};
use tether_types::{ConfigError, RetryConfig};

/// The default Anthropic API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// The default max tokens for a response.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// The default bound on chained tool calls per query.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Environment variables consulted by [`TetherConfig::load`].
pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_MODEL: &str = "TETHER_MODEL";
pub const ENV_BASE_URL: &str = "ANTHROPIC_API_BASE_URL";
pub const ENV_CONFIG_DIR: &str = "TETHER_CONFIG_DIR";

/// Resolved configuration for a Tether session.
#[derive(Debug, Clone)]
pub struct TetherConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_base_url: String,
    pub max_depth: usize,
    pub system_prompt: Option<String>,
    /// Retry schedule for capability invocations.
    pub invoker_retry: RetryConfig,
    /// Tool servers in name order.
    pub servers: Vec<ServerDescriptor>,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub invoker: InvokerSettings,
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    pub max_depth: Option<usize>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokerSettings {
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub max_depth: Option<usize>,
}

impl TetherConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (`~/.tether/config.toml`)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"))?;
        Self::resolve(settings, overrides, |key| std::env::var(key).ok(), config_dir)
    }

    /// Merge already-read settings with overrides and an environment lookup.
    pub fn resolve(
        settings: SettingsFile,
        overrides: CliOverrides,
        env: impl Fn(&str) -> Option<String>,
        config_dir: PathBuf,
    ) -> Result<Self, ConfigError> {
        // Resolve API key: CLI > env > config file
        let api_key = overrides
            .api_key
            .or_else(|| env(ENV_API_KEY))
            .or(settings.api.api_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: format!("api_key (set {ENV_API_KEY} or add it to ~/.tether/config.toml)"),
            })?;

        let model = overrides
            .model
            .or_else(|| env(ENV_MODEL))
            .or(settings.api.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens = overrides
            .max_tokens
            .or(settings.api.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);
        if max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "api.max_tokens".into(),
                message: "must be greater than zero".into(),
            });
        }

        let api_base_url = env(ENV_BASE_URL)
            .or(settings.api.base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let max_depth = overrides
            .max_depth
            .or(settings.orchestrator.max_depth)
            .unwrap_or(DEFAULT_MAX_DEPTH);
        if max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "orchestrator.max_depth".into(),
                message: "must be at least 1".into(),
            });
        }

        let mut invoker_retry = RetryConfig::default().exact();
        if let Some(retries) = settings.invoker.max_retries {
            invoker_retry.max_retries = retries;
        }
        if let Some(delay) = settings.invoker.initial_delay_ms {
            invoker_retry.initial_delay_ms = delay;
        }

        let servers = McpConfig {
            servers: settings.servers,
        }
        .descriptors()
        .map_err(|e| ConfigError::InvalidValue {
            key: "servers".into(),
            message: e.to_string(),
        })?;

        Ok(TetherConfig {
            api_key,
            model,
            max_tokens,
            api_base_url,
            max_depth,
            system_prompt: settings.orchestrator.system_prompt,
            invoker_retry,
            servers,
            config_dir,
        })
    }
}

/// Get the Tether config directory path (~/.tether/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tether")
}

/// Read and parse a TOML settings file. A missing file yields defaults; a
/// file that exists but does not parse is an error, since it usually holds
/// the server list.
pub fn load_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}", path.display());
            Ok(SettingsFile::default())
        }
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            Ok(SettingsFile::default())
        }
    }
}
