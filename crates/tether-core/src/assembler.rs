//! Folds one streamed completion into text, content blocks and at most one
//! capability call.

use serde_json::{Value, json};
use tether_types::{ApiErrorResponse, ContentBlock, ContentDelta, StopReason, StreamEvent, Usage};

use crate::partial_json::PartialJson;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    TextStreaming,
    ToolUseStreaming,
    Done,
}

/// A capability call the model asked for, with fully assembled arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityCall {
    pub id: String,
    pub name: String,
    pub input: Value,
    /// The raw argument text when it never formed a JSON object. `input` is
    /// then an empty object and the call must not run.
    pub malformed_arguments: Option<String>,
}

/// A tool_use block whose arguments are still streaming.
#[derive(Debug)]
struct PendingCapabilityCall {
    id: String,
    name: String,
    arguments: PartialJson,
}

#[derive(Debug)]
enum Active {
    Text(String),
    Tool(PendingCapabilityCall),
    /// A block we do not keep: unsupported types and extra tool_use blocks.
    Skipped,
}

/// Everything gathered from one response.
#[derive(Debug, Clone, Default)]
pub struct AssembledResponse {
    /// All text in arrival order.
    pub text: String,
    /// Content for the assistant history message.
    pub blocks: Vec<ContentBlock>,
    pub call: Option<CapabilityCall>,
    /// tool_use blocks ignored because a call was already taken.
    pub dropped_calls: usize,
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
    /// An `error` event from the stream.
    pub error: Option<ApiErrorResponse>,
}

#[derive(Debug)]
pub struct Assembler {
    state: AssemblerState,
    active: Option<Active>,
    response: AssembledResponse,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            state: AssemblerState::Idle,
            active: None,
            response: AssembledResponse::default(),
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Consume one event. Returns a text increment to show the user, if any.
    pub fn push(&mut self, event: StreamEvent) -> Option<String> {
        if self.state == AssemblerState::Done {
            return None;
        }

        match event {
            StreamEvent::MessageStart { message } => {
                self.response.usage.add(&message.usage);
                None
            }
            StreamEvent::ContentBlockStart { content_block, .. } => {
                self.close_block();
                self.open_block(content_block)
            }
            StreamEvent::ContentBlockDelta { delta, .. } => self.delta(delta),
            StreamEvent::ContentBlockStop { .. } => {
                self.close_block();
                None
            }
            StreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.response.stop_reason = delta.stop_reason;
                }
                if let Some(usage) = usage {
                    self.response.usage.add(&usage);
                }
                None
            }
            StreamEvent::MessageStop => {
                self.close_block();
                self.state = AssemblerState::Done;
                None
            }
            StreamEvent::Ping => None,
            StreamEvent::Error { error } => {
                tracing::error!("Completion stream error: {}: {}", error.error_type, error.message);
                self.close_block();
                self.response.error = Some(error);
                self.state = AssemblerState::Done;
                None
            }
        }
    }

    fn open_block(&mut self, block: ContentBlock) -> Option<String> {
        match block {
            ContentBlock::Text { text } => {
                self.state = AssemblerState::TextStreaming;
                self.active = Some(Active::Text(text.clone()));
                self.record_text(&text)
            }
            ContentBlock::ToolUse { id, name, .. } => {
                self.state = AssemblerState::ToolUseStreaming;
                if self.response.call.is_some() {
                    self.response.dropped_calls += 1;
                    tracing::warn!("Ignoring extra tool call '{name}' ({id}) in the same response");
                    self.active = Some(Active::Skipped);
                } else {
                    self.active = Some(Active::Tool(PendingCapabilityCall {
                        id,
                        name,
                        arguments: PartialJson::new(),
                    }));
                }
                None
            }
            ContentBlock::ToolResult { .. } | ContentBlock::Unsupported => {
                self.active = Some(Active::Skipped);
                None
            }
        }
    }

    fn delta(&mut self, delta: ContentDelta) -> Option<String> {
        match delta {
            ContentDelta::TextDelta { text } => {
                match &mut self.active {
                    Some(Active::Text(current)) => current.push_str(&text),
                    // Text without a preceding start event.
                    None => {
                        self.state = AssemblerState::TextStreaming;
                        self.active = Some(Active::Text(text.clone()));
                    }
                    Some(_) => return None,
                }
                self.record_text(&text)
            }
            ContentDelta::InputJsonDelta { partial_json } => {
                if let Some(Active::Tool(pending)) = &mut self.active {
                    pending.arguments.feed(&partial_json);
                }
                None
            }
            ContentDelta::Unsupported => None,
        }
    }

    fn record_text(&mut self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        self.response.text.push_str(text);
        Some(text.to_string())
    }

    fn close_block(&mut self) {
        match self.active.take() {
            Some(Active::Text(text)) if !text.is_empty() => {
                self.response.blocks.push(ContentBlock::Text { text });
            }
            Some(Active::Tool(mut pending)) => {
                let mut malformed_arguments = None;
                let input = pending.arguments.finish().unwrap_or_else(|| {
                    let raw = pending.arguments.buffer().trim();
                    if !raw.is_empty() {
                        tracing::warn!(
                            "Arguments for '{}' never formed a JSON object: {raw}",
                            pending.name
                        );
                        malformed_arguments = Some(raw.to_string());
                    }
                    json!({})
                });
                self.response.blocks.push(ContentBlock::ToolUse {
                    id: pending.id.clone(),
                    name: pending.name.clone(),
                    input: input.clone(),
                });
                self.response.call = Some(CapabilityCall {
                    id: pending.id,
                    name: pending.name,
                    input,
                    malformed_arguments,
                });
            }
            _ => {}
        }
        if self.state != AssemblerState::Done {
            self.state = AssemblerState::Idle;
        }
    }

    /// Close any open block and hand over the result.
    pub fn finish(mut self) -> AssembledResponse {
        self.close_block();
        self.response
    }

    /// Names in `required` that `input` leaves absent, `null` or blank.
    pub fn missing_required(input: &Value, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| match input.get(**name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .map(|name| name.to_string())
            .collect()
    }
}
