//! Anthropic behind the orchestrator's [`Provider`] seam.

use crate::client::ApiClient;
use std::future::Future;
use std::pin::Pin;
use tether_types::provider::{EventStream, Provider};
use tether_types::{ApiError, CreateMessageRequest, RetryConfig};

/// Model ids listed by `/model`, newest first.
pub const ANTHROPIC_MODELS: &[&str] = &[
    "claude-sonnet-4-5-20250929",
    "claude-opus-4-1-20250805",
    "claude-3-5-haiku-20241022",
];

/// Streams turns from the Messages API. Retries happen inside [`ApiClient`]
/// before the stream is handed over.
#[derive(Clone)]
pub struct AnthropicProvider {
    client: ApiClient,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(api_key, base_url)?,
        })
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.client = self.client.with_retry_config(config);
        self
    }
}

impl Provider for AnthropicProvider {
    fn create_message_stream<'a>(
        &'a self,
        request: &'a CreateMessageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, ApiError>> + Send + 'a>> {
        Box::pin(async move {
            let stream = self.client.create_message_stream(request).await?;
            Ok(Box::pin(stream) as EventStream)
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> &[&'static str] {
        ANTHROPIC_MODELS
    }
}
