//! In-process tool servers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tether_mcp::jsonrpc::JsonRpcResponse;
use tether_mcp::{
    Availability, AvailabilityStatus, BoxFuture, Connector, McpError, ServerDescriptor, Transport,
};
use tokio::sync::Notify;

/// Answers `tools/call`: (call number starting at 1, tool name, arguments) -> result object.
pub type Responder = Arc<dyn Fn(u32, &str, &Value) -> Result<Value, McpError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct MockServer {
    pub tools: Vec<Value>,
    pub fail_initialize: bool,
    /// When set, `initialize` waits for a permit.
    pub handshake_gate: Option<Arc<Notify>>,
    pub responder: Option<Responder>,
    pub calls: Arc<Mutex<Vec<(String, Value)>>>,
    pub closes: Arc<AtomicUsize>,
    /// Reported unreachable by the availability check.
    pub unavailable: bool,
    /// How long releasing the transport takes.
    pub close_delay: Option<Duration>,
}

impl MockServer {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names.iter().map(|n| tool(n, &[])).collect(),
            ..Self::default()
        }
    }

    pub fn responding(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn slow_to_close(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// A tool entry as `tools/list` returns it.
pub fn tool(name: &str, required: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> = required
        .iter()
        .map(|r| (r.to_string(), json!({"type": "string"})))
        .collect();
    json!({
        "name": name,
        "description": format!("{name} tool"),
        "inputSchema": {"type": "object", "properties": properties, "required": required},
    })
}

/// A `tools/call` result carrying one text item.
pub fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

struct MockTransport {
    server: MockServer,
    calls_made: AtomicU32,
}

fn ok(result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        id: Some(1),
        result: Some(result),
        error: None,
    }
}

impl Transport for MockTransport {
    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, McpError>> {
        Box::pin(async move {
            match method {
                "initialize" => {
                    if let Some(gate) = &self.server.handshake_gate {
                        gate.notified().await;
                    }
                    if self.server.fail_initialize {
                        return Err(McpError::Protocol("initialize rejected".into()));
                    }
                    Ok(ok(json!({"protocolVersion": "2024-11-05", "capabilities": {}})))
                }
                "tools/list" => Ok(ok(json!({"tools": self.server.tools}))),
                "tools/call" => {
                    let params = params.unwrap_or_default();
                    let name = params["name"].as_str().unwrap_or_default().to_string();
                    let args = params["arguments"].clone();
                    self.server.calls.lock().unwrap().push((name.clone(), args.clone()));
                    let n = self.calls_made.fetch_add(1, Ordering::SeqCst) + 1;
                    match &self.server.responder {
                        Some(respond) => respond(n, &name, &args).map(ok),
                        None => Ok(ok(text_result("ok"))),
                    }
                }
                other => Err(McpError::Protocol(format!("unexpected method {other}"))),
            }
        })
    }

    fn notify<'a>(&'a self, _method: &'a str, _params: Option<Value>) -> BoxFuture<'a, Result<(), McpError>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Some(delay) = self.server.close_delay {
                tokio::time::sleep(delay).await;
            }
            self.server.closes.fetch_add(1, Ordering::SeqCst);
        })
    }
}

#[derive(Default)]
pub struct MockConnector {
    pub servers: HashMap<String, MockServer>,
    pub opens: AtomicUsize,
}

impl MockConnector {
    pub fn new(servers: Vec<(&str, MockServer)>) -> Self {
        Self {
            servers: servers
                .into_iter()
                .map(|(name, server)| (name.to_string(), server))
                .collect(),
            opens: AtomicUsize::new(0),
        }
    }

    /// Descriptors for every mock server, in the given order.
    pub fn descriptors(names: &[&str]) -> Vec<ServerDescriptor> {
        names
            .iter()
            .map(|n| ServerDescriptor::http(*n, format!("http://{n}.invalid/mcp")))
            .collect()
    }
}

impl Connector for MockConnector {
    fn open<'a>(
        &'a self,
        descriptor: &'a ServerDescriptor,
    ) -> BoxFuture<'a, Result<Box<dyn Transport>, McpError>> {
        Box::pin(async move {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let server = self.servers.get(&descriptor.name).cloned().ok_or_else(|| {
                McpError::ConnectionFailed {
                    server: descriptor.name.clone(),
                    reason: "no such mock".into(),
                }
            })?;
            Ok(Box::new(MockTransport {
                server,
                calls_made: AtomicU32::new(0),
            }) as Box<dyn Transport>)
        })
    }

    fn probe<'a>(
        &'a self,
        descriptor: &'a ServerDescriptor,
        _timeout: Duration,
    ) -> BoxFuture<'a, Availability> {
        let reachable = self
            .servers
            .get(&descriptor.name)
            .is_some_and(|server| !server.unavailable);
        Box::pin(async move {
            Availability {
                status: if reachable {
                    AvailabilityStatus::Available
                } else {
                    AvailabilityStatus::Unavailable
                },
                latency: Duration::from_millis(1),
                diagnostic: "mock".into(),
            }
        })
    }
}
