//! Transports carry JSON-RPC between a session and one tool server.

mod http;
mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use std::future::Future;
use std::pin::Pin;

use crate::error::McpError;
use crate::jsonrpc::JsonRpcResponse;

/// Boxed, sendable future used at the dyn-compatible seams of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A bidirectional JSON-RPC channel to a tool server.
///
/// `close` must be idempotent; requests issued after it fail.
pub trait Transport: Send + Sync {
    /// Send a request and wait for the response with the matching id.
    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, McpError>>;

    /// Send a notification; no response is expected.
    fn notify<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> BoxFuture<'a, Result<(), McpError>>;

    /// Release the underlying process or HTTP session.
    fn close(&self) -> BoxFuture<'_, ()>;
}
