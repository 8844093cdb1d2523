//! Tool-server configuration: the `[servers.<name>]` tables and the
//! immutable descriptors built from them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::McpError;

fn default_timeout() -> u64 {
    30000
}

fn default_enabled() -> bool {
    true
}

/// Top-level tool-server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

/// One `[servers.<name>]` table. Exactly one of `url` or `command` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Streamable HTTP endpoint (e.g. `https://mcp.example.com/mcp`).
    #[serde(default)]
    pub url: Option<String>,
    /// Command to launch a stdio server (e.g. `npx`).
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Display label; defaults to the table name.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-request timeout in milliseconds (default: 30000).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

/// Where a tool server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Http {
        url: String,
    },
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Http { url } => f.write_str(url),
            Endpoint::Stdio { command, args, .. } if args.is_empty() => f.write_str(command),
            Endpoint::Stdio { command, args, .. } => write!(f, "{command} {}", args.join(" ")),
        }
    }
}

/// Immutable description of a configured tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub name: String,
    pub endpoint: Endpoint,
    pub label: String,
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl ServerDescriptor {
    /// Descriptor for a Streamable HTTP server with default settings.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            endpoint: Endpoint::Http { url: url.into() },
            enabled: true,
            timeout_ms: default_timeout(),
        }
    }

    /// Descriptor for a stdio server with default settings.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            endpoint: Endpoint::Stdio {
                command: command.into(),
                args,
                env: HashMap::new(),
            },
            enabled: true,
            timeout_ms: default_timeout(),
        }
    }

    pub fn from_config(name: &str, config: &ServerConfig) -> Result<Self, McpError> {
        let invalid = |message: &str| McpError::InvalidDescriptor {
            name: name.to_string(),
            message: message.to_string(),
        };

        let endpoint = match (&config.url, &config.command) {
            (Some(url), None) => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(invalid("url must start with http:// or https://"));
                }
                Endpoint::Http { url: url.clone() }
            }
            (None, Some(command)) if !command.trim().is_empty() => Endpoint::Stdio {
                command: command.clone(),
                args: config.args.clone(),
                env: config.env.clone(),
            },
            (None, Some(_)) => return Err(invalid("command must not be empty")),
            (Some(_), Some(_)) => return Err(invalid("set either url or command, not both")),
            (None, None) => return Err(invalid("one of url or command is required")),
        };

        Ok(Self {
            name: name.to_string(),
            endpoint,
            label: config.label.clone().unwrap_or_else(|| name.to_string()),
            enabled: config.enabled,
            timeout_ms: config.timeout_ms,
        })
    }
}

impl McpConfig {
    /// Build descriptors for every configured server, in name order.
    pub fn descriptors(&self) -> Result<Vec<ServerDescriptor>, McpError> {
        self.servers
            .iter()
            .map(|(name, config)| ServerDescriptor::from_config(name, config))
            .collect()
    }
}
