//! The conversation loop: query the model, run the capability it asks for,
//! feed the result back, and repeat until it answers in plain text or the
//! chain gets too deep.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tether_mcp::{Capability, ConnectionManager, Invoker, McpError};
use tether_types::{CreateMessageRequest, Message, Role, ellipsize, provider::Provider};

use crate::assembler::{AssembledResponse, Assembler, AssemblerState, CapabilityCall};

/// Default bound on chained capability calls per query.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Events emitted while a query runs. `Done` is always last.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    TextDelta(String),
    ToolCall { name: String, input: Value },
    ToolResult {
        name: String,
        text: String,
        is_error: bool,
    },
    Warning(String),
    /// The completion request or its stream failed; the query ends here.
    Error(String),
    Done { text: String },
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub model: String,
    pub max_tokens: u32,
    pub max_depth: usize,
    pub system_prompt: Option<String>,
}

impl OrchestratorConfig {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            max_depth: DEFAULT_MAX_DEPTH,
            system_prompt: None,
        }
    }
}

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    invoker: Invoker,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, invoker: Invoker, config: OrchestratorConfig) -> Self {
        Self {
            provider,
            invoker,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Model used by the next request.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Switch models for later queries. The id is not validated; a bad one
    /// fails on the next request.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
        tracing::info!("Model set to {}", self.config.model);
    }

    /// The backend's name and the models it suggests.
    pub fn available_models(&self) -> (&str, &[&'static str]) {
        (self.provider.name(), self.provider.models())
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        self.invoker.manager()
    }

    pub async fn connect_to_server(&self, name: &str) -> Result<(), McpError> {
        self.manager().connect(name).await
    }

    pub async fn disconnect_from_server(&self, name: &str) -> Result<(), McpError> {
        self.manager().disconnect(name).await
    }

    pub async fn connected_servers(&self) -> Vec<String> {
        self.manager().list_connected().await
    }

    /// Capabilities of every connected server, with the server name.
    pub async fn capabilities(&self) -> Vec<(String, Capability)> {
        self.manager().capabilities().await
    }

    /// Run a query to completion and return the final answer.
    pub async fn process_query(&self, text: &str) -> String {
        self.process_query_streaming(text, |_| {}).await
    }

    /// Run a query, reporting progress through `on_event`. The returned
    /// answer equals the text of the final [`QueryEvent::Done`].
    pub async fn process_query_streaming<F>(&self, text: &str, mut on_event: F) -> String
    where
        F: FnMut(QueryEvent),
    {
        let mut history = vec![Message::user_text(text)];
        let mut answer = String::new();
        let mut depth = 0;

        loop {
            let (response, error) = self.query(&mut history, &mut on_event).await;
            append_section(&mut answer, &response.text);

            if let Some(error) = error {
                tracing::error!("Completion failed at depth {depth}: {error}");
                append_section(&mut answer, &format!("Error: {error}"));
                on_event(QueryEvent::Error(error));
                break;
            }

            let Some(call) = response.call else {
                break;
            };

            history.push(Message {
                role: Role::Assistant,
                content: response.blocks,
            });
            append_section(
                &mut answer,
                &format!("[Calling tool {} with args {}]", call.name, call.input),
            );
            on_event(QueryEvent::ToolCall {
                name: call.name.clone(),
                input: call.input.clone(),
            });

            let (result_text, is_error) = self.run_call(&call).await;
            on_event(QueryEvent::ToolResult {
                name: call.name.clone(),
                text: result_text.clone(),
                is_error,
            });
            history.push(Message::tool_result(call.id, result_text, is_error));

            depth += 1;
            if depth >= self.config.max_depth {
                let warning = format!(
                    "[Stopped after {depth} chained tool calls: maximum chain depth reached]"
                );
                tracing::warn!("{warning}");
                append_section(&mut answer, &warning);
                on_event(QueryEvent::Warning(warning));
                break;
            }
        }

        on_event(QueryEvent::Done {
            text: answer.clone(),
        });
        answer
    }

    /// One completion request over the current history, with capability
    /// definitions taken fresh from the registry. Returns whatever was
    /// assembled plus an error description if the request or stream failed.
    async fn query<F>(
        &self,
        history: &mut Vec<Message>,
        on_event: &mut F,
    ) -> (AssembledResponse, Option<String>)
    where
        F: FnMut(QueryEvent),
    {
        let definitions = self.manager().definitions().await;
        let mut request = CreateMessageRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: std::mem::take(history),
            system: self.config.system_prompt.clone(),
            tools: (!definitions.is_empty()).then_some(definitions),
            temperature: None,
            stream: true,
        };

        let stream_result = self.provider.create_message_stream(&request).await;
        // Hand the history back without copying it.
        *history = std::mem::take(&mut request.messages);

        let mut assembler = Assembler::new();
        let mut stream = match stream_result {
            Ok(stream) => stream,
            Err(e) => return (assembler.finish(), Some(e.to_string())),
        };

        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    if let Some(delta) = assembler.push(event) {
                        on_event(QueryEvent::TextDelta(delta));
                    }
                    if assembler.state() == AssemblerState::Done {
                        break;
                    }
                }
                Err(e) => return (assembler.finish(), Some(e.to_string())),
            }
        }

        // A stream that stops short may hold a half-written call.
        if assembler.state() != AssemblerState::Done {
            tracing::warn!("Completion stream ended in state {:?}", assembler.state());
            return (
                assembler.finish(),
                Some("Response stream ended before message_stop".to_string()),
            );
        }

        let response = assembler.finish();
        let error = response
            .error
            .as_ref()
            .map(|e| format!("{}: {}", e.error_type, e.message));
        (response, error)
    }

    /// Validate and invoke one call. Returns the tool_result text and whether
    /// it reports an error.
    async fn run_call(&self, call: &CapabilityCall) -> (String, bool) {
        if let Some(raw) = &call.malformed_arguments {
            return (
                format!(
                    "The arguments for `{}` were not valid JSON: {}. Nothing was run. Call it again with a complete JSON object.",
                    call.name,
                    ellipsize(raw, 200)
                ),
                true,
            );
        }

        if let Some(capability) = self.manager().capability(&call.name).await {
            let missing = Assembler::missing_required(&call.input, &capability.required_params());
            if !missing.is_empty() {
                tracing::warn!("Call to '{}' is missing {}", call.name, missing.join(", "));
                return (
                    format!(
                        "Missing required parameter(s): {}. Please call `{}` again and supply every required parameter.",
                        missing.join(", "),
                        call.name
                    ),
                    true,
                );
            }
        }

        match self.invoker.invoke(&call.name, call.input.clone()).await {
            Ok(result) => (result.text, result.is_error),
            Err(e) => (
                format!(
                    "Tool `{}` could not be used: {e}. Continue without it and answer with the information available.",
                    call.name
                ),
                true,
            ),
        }
    }
}

/// Append `piece` on its own line.
fn append_section(answer: &mut String, piece: &str) {
    if piece.is_empty() {
        return;
    }
    if !answer.is_empty() && !answer.ends_with('\n') {
        answer.push('\n');
    }
    answer.push_str(piece);
}
