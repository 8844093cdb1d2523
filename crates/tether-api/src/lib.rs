//! Anthropic Messages API client with SSE streaming for Tether.

mod client;
mod provider;
mod retry;
mod stream;

pub use client::ApiClient;
pub use provider::{ANTHROPIC_MODELS, AnthropicProvider};
pub use stream::MessageStream;
pub use tether_types::RetryConfig;
