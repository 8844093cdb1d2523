//! Error types for MCP operations.

use thiserror::Error;

/// Errors from tool-server connections and capability invocation.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to connect to MCP server '{server}': {reason}")]
    ConnectionFailed { server: String, reason: String },

    #[error("Unknown MCP server '{name}'")]
    UnknownServer { name: String },

    #[error("MCP server '{name}' is disabled")]
    ServerDisabled { name: String },

    #[error("A connection to MCP server '{name}' is already in progress")]
    ConnectInProgress { name: String },

    #[error("Connection to MCP server '{name}' was abandoned by a disconnect")]
    Abandoned { name: String },

    #[error("Session with MCP server '{name}' was closed")]
    SessionClosed { name: String },

    #[error("No connected server provides capability '{name}'")]
    CapabilityNotFound { name: String },

    #[error("Capability '{capability}' failed after {attempts} attempts: {last_error}")]
    InvocationFailed {
        capability: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid configuration for MCP server '{name}': {message}")]
    InvalidDescriptor { name: String, message: String },

    #[error("Failed to spawn MCP server '{name}': {source}")]
    SpawnFailed {
        name: String,
        source: std::io::Error,
    },

    #[error("JSON-RPC error from '{server}' (code {code}): {message}")]
    JsonRpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("HTTP {status} from MCP server '{server}'")]
    Http { server: String, status: u16 },

    #[error("Network error talking to MCP server '{server}': {message}")]
    Network { server: String, message: String },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP request '{name}' timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

