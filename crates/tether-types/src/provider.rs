//! The seam between the conversation loop and a completion service.
//!
//! The orchestrator only ever sees canonical [`StreamEvent`]s. Anthropic is
//! the one backend wired up today (`tether_api::AnthropicProvider`); tests
//! plug in scripted providers here.

use crate::{ApiError, CreateMessageRequest, StreamEvent};
use futures_core::Stream;
use std::future::Future;
use std::pin::Pin;

/// Events of one streamed turn, in arrival order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ApiError>> + Send>>;

/// Something that can stream the assistant's next turn for a request.
pub trait Provider: Send + Sync {
    /// Start a turn. An `Err` means no event was produced; failures after the
    /// stream opened arrive as items of the stream.
    fn create_message_stream<'a>(
        &'a self,
        request: &'a CreateMessageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, ApiError>> + Send + 'a>>;

    /// Short backend name shown next to its model list.
    fn name(&self) -> &str;

    /// Model ids worth offering for `/model`. Any other id is still passed
    /// through to the backend unchecked.
    fn models(&self) -> &[&'static str] {
        &[]
    }
}
