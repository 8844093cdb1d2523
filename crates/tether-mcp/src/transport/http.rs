//! Streamable HTTP transport.
//!
//! Every JSON-RPC message is POSTed to the endpoint URL. The server answers
//! either with a JSON body or with a `text/event-stream` whose `data:` lines
//! carry the response. A `mcp-session-id` issued on any response is echoed on
//! every later request and used to end the session on close.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use tether_types::sse::{SseEvent, SseParser};

use super::{BoxFuture, Transport};
use crate::error::McpError;
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// JSON-RPC over Streamable HTTP.
pub struct HttpTransport {
    server: String,
    url: String,
    http: reqwest::Client,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    timeout_ms: u64,
}

impl HttpTransport {
    pub fn new(
        server: impl Into<String>,
        url: impl Into<String>,
        http: reqwest::Client,
        timeout_ms: u64,
    ) -> Self {
        Self {
            server: server.into(),
            url: url.into(),
            http,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            timeout_ms,
        }
    }

    /// The session id issued by the server, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|id| id.clone())
    }

    fn remember_session(&self, headers: &HeaderMap) {
        let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
            return;
        };
        if let Ok(mut current) = self.session_id.lock() {
            if current.as_deref() != Some(id) {
                tracing::debug!("'{}': session id {id}", self.server);
                *current = Some(id.to_string());
            }
        }
    }

    fn ensure_open(&self) -> Result<(), McpError> {
        if self.closed.load(Ordering::Acquire) {
            Err(McpError::SessionClosed {
                name: self.server.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn post(&self, body: String) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_BOTH)
            .body(body);
        if let Some(id) = self.session_id() {
            request = request.header(SESSION_HEADER, id);
        }
        request
    }

    fn network_error(&self, method: &str, err: reqwest::Error) -> McpError {
        if err.is_timeout() {
            McpError::Timeout {
                name: method.to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else {
            McpError::Network {
                server: self.server.clone(),
                message: err.to_string(),
            }
        }
    }

    async fn exchange(&self, id: u64, method: &str, body: String) -> Result<JsonRpcResponse, McpError> {
        let response = self
            .post(body)
            .send()
            .await
            .map_err(|e| self.network_error(method, e))?;

        let status = response.status();
        tracing::debug!("'{}' -> {method} (id {id}): HTTP {status}", self.server);
        if !status.is_success() {
            return Err(McpError::Http {
                server: self.server.clone(),
                status: status.as_u16(),
            });
        }
        self.remember_session(response.headers());

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("text/event-stream") {
            let mut parser = SseParser::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| self.network_error(method, e))?;
                if let Some(resp) = find_response(parser.feed_bytes(&chunk), id) {
                    return Ok(resp);
                }
            }
            find_response(parser.finish(), id).ok_or_else(|| {
                McpError::Protocol(format!(
                    "'{}': event stream ended without a response to {method}",
                    self.server
                ))
            })
        } else {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| self.network_error(method, e))?;
            Ok(serde_json::from_slice(&bytes)?)
        }
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        self.ensure_open()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        tracing::debug!("'{}' <- {method} (id {id})", self.server);

        match tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            self.exchange(id, method, body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout {
                name: method.to_string(),
                timeout_ms: self.timeout_ms,
            }),
        }
    }

    async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.ensure_open()?;
        let body = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        let response = self
            .post(body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| self.network_error(method, e))?;

        // 202 Accepted is the usual answer; any success is fine.
        if !response.status().is_success() {
            return Err(McpError::Http {
                server: self.server.clone(),
                status: response.status().as_u16(),
            });
        }
        self.remember_session(response.headers());
        Ok(())
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(id) = self.session_id() else {
            return;
        };
        // Best effort: servers may not support explicit termination.
        let result = self
            .http
            .delete(&self.url)
            .header(SESSION_HEADER, id)
            .timeout(Duration::from_millis(self.timeout_ms.min(5000)))
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!("'{}': session termination failed: {e}", self.server);
        }
    }
}

/// Pick the response to request `id` out of a batch of SSE events.
/// Events carrying notifications or other ids are skipped.
fn find_response(events: impl IntoIterator<Item = SseEvent>, id: u64) -> Option<JsonRpcResponse> {
    events.into_iter().find_map(|event| {
        serde_json::from_str::<JsonRpcResponse>(&event.data)
            .ok()
            .filter(|resp| resp.id == Some(id))
    })
}

impl Transport for HttpTransport {
    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, McpError>> {
        Box::pin(self.send_request(method, params))
    }

    fn notify<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> BoxFuture<'a, Result<(), McpError>> {
        Box::pin(self.send_notification(method, params))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}
