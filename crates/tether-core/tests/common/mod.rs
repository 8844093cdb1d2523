//! Scripted completion provider and in-process tool servers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream;
use serde_json::{Value, json};
use tether_mcp::jsonrpc::JsonRpcResponse;
use tether_mcp::{
    Availability, AvailabilityStatus, BoxFuture, ConnectionManager, Connector, Invoker, McpError,
    ServerDescriptor, Transport,
};
use tether_types::provider::{EventStream, Provider};
use tether_types::{
    ApiError, ContentBlock, ContentDelta, CreateMessageRequest, CreateMessageResponse,
    MessageDelta, Role, RetryConfig, StopReason, StreamEvent, Usage,
};

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Replays one scripted turn per request. Once the script runs out it keeps
/// answering with `repeat` (or a plain "done" turn).
pub struct MockProvider {
    script: Mutex<VecDeque<Result<Vec<StreamEvent>, ApiError>>>,
    repeat: Option<Vec<StreamEvent>>,
    pub requests: Mutex<Vec<CreateMessageRequest>>,
}

impl MockProvider {
    pub fn new(turns: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            script: Mutex::new(turns.into_iter().map(Ok).collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(script: Vec<Result<Vec<StreamEvent>, ApiError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(turn: Vec<StreamEvent>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(turn),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, n: usize) -> CreateMessageRequest {
        self.requests.lock().unwrap()[n].clone()
    }
}

impl Provider for MockProvider {
    fn create_message_stream<'a>(
        &'a self,
        request: &'a CreateMessageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, ApiError>> + Send + 'a>> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        let turn = match next {
            Some(turn) => turn,
            None => Ok(self.repeat.clone().unwrap_or_else(|| text_turn("done"))),
        };
        Box::pin(async move {
            let events = turn?;
            Ok(Box::pin(stream::iter(events.into_iter().map(Ok))) as EventStream)
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn message_start() -> StreamEvent {
    StreamEvent::MessageStart {
        message: CreateMessageResponse {
            id: "msg_mock".into(),
            response_type: "message".into(),
            role: Role::Assistant,
            content: vec![],
            model: "mock-model".into(),
            stop_reason: None,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 1,
            },
        },
    }
}

fn message_end(stop_reason: StopReason) -> Vec<StreamEvent> {
    vec![
        StreamEvent::MessageDelta {
            delta: MessageDelta {
                stop_reason: Some(stop_reason),
            },
            usage: None,
        },
        StreamEvent::MessageStop,
    ]
}

/// A turn that answers in plain text.
pub fn text_turn(text: &str) -> Vec<StreamEvent> {
    let mut events = vec![
        message_start(),
        StreamEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlock::Text {
                text: String::new(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentDelta::TextDelta { text: text.into() },
        },
        StreamEvent::ContentBlockStop { index: 0 },
    ];
    events.extend(message_end(StopReason::EndTurn));
    events
}

/// A turn that says `preface` and then calls `name`, streaming the arguments
/// in the given fragments.
pub fn tool_turn(preface: &str, id: &str, name: &str, fragments: &[&str]) -> Vec<StreamEvent> {
    let mut events = vec![message_start()];
    let mut index = 0;
    if !preface.is_empty() {
        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::Text {
                text: String::new(),
            },
        });
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::TextDelta {
                text: preface.into(),
            },
        });
        events.push(StreamEvent::ContentBlockStop { index });
        index += 1;
    }
    events.push(StreamEvent::ContentBlockStart {
        index,
        content_block: ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input: json!({}),
        },
    });
    for fragment in fragments {
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::InputJsonDelta {
                partial_json: fragment.to_string(),
            },
        });
    }
    events.push(StreamEvent::ContentBlockStop { index });
    events.extend(message_end(StopReason::ToolUse));
    events
}

// ---------------------------------------------------------------------------
// Mock tool servers
// ---------------------------------------------------------------------------

pub type Responder = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct MockServer {
    pub tools: Vec<Value>,
    pub responder: Responder,
    pub calls: Arc<Mutex<Vec<(String, Value)>>>,
    /// When set, every `tools/call` fails at the transport with this message.
    pub outage: Option<String>,
}

impl MockServer {
    pub fn new(tools: Vec<Value>, responder: Responder) -> Self {
        Self {
            tools,
            responder,
            calls: Arc::new(Mutex::new(Vec::new())),
            outage: None,
        }
    }

    /// A server that lists `tools` but whose calls never get through.
    pub fn unreachable_calls(tools: Vec<Value>, message: &str) -> Self {
        Self {
            outage: Some(message.to_string()),
            ..Self::new(tools, Arc::new(|_: &str, _: &Value| text_content("unused")))
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

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

/// `tools/call` result with one text item.
pub fn text_content(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

struct MockTransport(MockServer);

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
                "initialize" => Ok(ok(json!({"protocolVersion": "2024-11-05"}))),
                "tools/list" => Ok(ok(json!({"tools": self.0.tools}))),
                "tools/call" => {
                    let params = params.unwrap_or_default();
                    let name = params["name"].as_str().unwrap_or_default().to_string();
                    let args = params["arguments"].clone();
                    self.0.calls.lock().unwrap().push((name.clone(), args.clone()));
                    if let Some(message) = &self.0.outage {
                        return Err(McpError::Network {
                            server: "mock".into(),
                            message: message.clone(),
                        });
                    }
                    Ok(ok((self.0.responder)(&name, &args)))
                }
                other => Err(McpError::Protocol(format!("unexpected {other}"))),
            }
        })
    }

    fn notify<'a>(&'a self, _method: &'a str, _params: Option<Value>) -> BoxFuture<'a, Result<(), McpError>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

pub struct MockConnector(HashMap<String, MockServer>);

impl Connector for MockConnector {
    fn open<'a>(
        &'a self,
        descriptor: &'a ServerDescriptor,
    ) -> BoxFuture<'a, Result<Box<dyn Transport>, McpError>> {
        let server = self.0.get(&descriptor.name).cloned();
        Box::pin(async move {
            let server = server.ok_or_else(|| McpError::ConnectionFailed {
                server: descriptor.name.clone(),
                reason: "no such mock".into(),
            })?;
            Ok(Box::new(MockTransport(server)) as Box<dyn Transport>)
        })
    }

    fn probe<'a>(
        &'a self,
        _descriptor: &'a ServerDescriptor,
        _timeout: Duration,
    ) -> BoxFuture<'a, Availability> {
        Box::pin(async {
            Availability {
                status: AvailabilityStatus::Available,
                latency: Duration::ZERO,
                diagnostic: "mock".into(),
            }
        })
    }
}

/// Connect every server and wrap the manager in an invoker with short retries.
pub async fn connected_invoker(servers: Vec<(&str, MockServer)>) -> Invoker {
    let descriptors = servers
        .iter()
        .map(|(name, _)| ServerDescriptor::http(*name, format!("http://{name}.invalid/mcp")))
        .collect();
    let names: Vec<String> = servers.iter().map(|(n, _)| n.to_string()).collect();
    let connector = MockConnector(
        servers
            .into_iter()
            .map(|(name, server)| (name.to_string(), server))
            .collect(),
    );
    let manager = Arc::new(ConnectionManager::new(descriptors, Arc::new(connector)));
    for name in &names {
        manager.connect(name).await.unwrap();
    }
    Invoker::new(manager).with_retry_config(RetryConfig {
        max_retries: 2,
        initial_delay_ms: 5,
        max_delay_ms: 20,
        backoff_factor: 2.0,
        jitter: false,
    })
}
