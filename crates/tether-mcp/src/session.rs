//! One live connection to a tool server.
//!
//! Opening a session runs the MCP handshake (`initialize`, then
//! `notifications/initialized`) and discovery (`tools/list`). A session only
//! exists once all of that succeeded.

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ServerDescriptor;
use crate::error::McpError;
use crate::registry::Capability;
use crate::transport::Transport;

/// MCP protocol version we speak.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on `tools/list` pages followed during discovery.
const MAX_LIST_PAGES: usize = 50;

/// Raw outcome of `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallOutcome {
    /// The `content` field as sent; `None` when the server omitted it.
    pub content: Option<Value>,
    /// The server flagged the call as failed (`isError: true`).
    pub is_error: bool,
}

pub struct ServerSession {
    descriptor: ServerDescriptor,
    transport: Box<dyn Transport>,
    capabilities: Vec<Capability>,
    closed: CancellationToken,
}

#[derive(Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<ToolEntry>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema")]
    input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ServerSession {
    /// Handshake and discover over an already opened transport.
    ///
    /// On any failure the transport is closed before the error is returned.
    pub async fn open(
        descriptor: ServerDescriptor,
        transport: Box<dyn Transport>,
    ) -> Result<Self, McpError> {
        match handshake(&descriptor.name, transport.as_ref()).await {
            Ok(capabilities) => {
                tracing::info!(
                    "MCP server '{}' connected with {} tools",
                    descriptor.name,
                    capabilities.len()
                );
                Ok(Self {
                    descriptor,
                    transport,
                    capabilities,
                    closed: CancellationToken::new(),
                })
            }
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Invoke `tools/call`. Fails with [`McpError::SessionClosed`] as soon as
    /// the session is closed, even mid-request.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallOutcome, McpError> {
        let closed = || McpError::SessionClosed {
            name: self.descriptor.name.clone(),
        };
        if self.is_closed() {
            return Err(closed());
        }

        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        let response = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(closed()),
            response = self.transport.request("tools/call", Some(params)) => response?,
        };

        let result = response.into_result(&self.descriptor.name)?;
        if !result.is_object() {
            return Err(McpError::Protocol(format!(
                "'{}': tools/call returned a non-object result",
                self.descriptor.name
            )));
        }

        Ok(ToolCallOutcome {
            content: result.get("content").cloned(),
            is_error: result
                .get("isError")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Make in-flight and future calls fail with `SessionClosed`.
    pub(crate) fn signal_closed(&self) {
        self.closed.cancel();
    }

    /// Signal in-flight calls, then release the transport.
    pub(crate) async fn close(&self) {
        self.closed.cancel();
        self.transport.close().await;
        tracing::debug!("MCP session '{}' closed", self.descriptor.name);
    }
}

async fn handshake(server: &str, transport: &dyn Transport) -> Result<Vec<Capability>, McpError> {
    let init_params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "tether",
            "version": env!("CARGO_PKG_VERSION")
        }
    });

    let init = transport
        .request("initialize", Some(init_params))
        .await?
        .into_result(server)?;
    if let Some(version) = init.get("protocolVersion").and_then(Value::as_str) {
        if version != PROTOCOL_VERSION {
            tracing::debug!("'{server}' negotiated protocol version {version}");
        }
    }

    transport.notify("notifications/initialized", None).await?;

    let mut capabilities = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_LIST_PAGES {
        let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
        let result = transport
            .request("tools/list", params)
            .await?
            .into_result(server)?;
        if result.is_null() {
            break;
        }
        let page: ToolsListResult = serde_json::from_value(result).map_err(|e| {
            McpError::Protocol(format!("'{server}': failed to parse tools/list response: {e}"))
        })?;
        capabilities.extend(page.tools.into_iter().map(|t| {
            Capability::new(t.name, t.description.unwrap_or_default(), t.input_schema)
        }));
        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }

    Ok(capabilities)
}
