//! Capability invocation with retry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tether_types::RetryConfig;

use crate::error::McpError;
use crate::format::format_tool_response;
use crate::manager::ConnectionManager;

/// Outcome of one successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    /// Server that answered.
    pub server: String,
    /// The `content` the server sent; `None` when it sent none.
    pub raw: Option<Value>,
    /// Normalized text for the conversation.
    pub text: String,
    /// The server reported a tool-level error.
    pub is_error: bool,
}

pub struct Invoker {
    manager: Arc<ConnectionManager>,
    retry: RetryConfig,
}

impl Invoker {
    /// Two retries, 1 s then 2 s apart, no jitter.
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            retry: RetryConfig::default().exact(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Invoke capability `name` on whichever server owns it.
    ///
    /// The owner is looked up again before every attempt. A name nobody
    /// advertises fails at once with [`McpError::CapabilityNotFound`].
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<InvocationResult, McpError> {
        let max_attempts = self.retry.max_attempts();
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < max_attempts {
            let session = match self.manager.session_for(name).await {
                Ok(session) => session,
                Err(e) if attempts == 0 => return Err(e),
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            };

            attempts += 1;
            tracing::debug!(
                "Invoking '{name}' on '{}' (attempt {attempts}/{max_attempts})",
                session.name()
            );

            match session.call_tool(name, arguments.clone()).await {
                Ok(outcome) => {
                    return Ok(InvocationResult {
                        server: session.name().to_string(),
                        text: format_tool_response(outcome.content.as_ref()),
                        raw: outcome.content,
                        is_error: outcome.is_error,
                    });
                }
                Err(e) => {
                    if attempts < max_attempts {
                        let delay = self.retry.delay_ms(attempts - 1, None);
                        tracing::warn!(
                            "Capability '{name}' failed (attempt {attempts}/{max_attempts}): {e}. Retrying in {delay}ms..."
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
        tracing::error!("Capability '{name}' failed after {attempts} attempts: {last_error}");
        Err(McpError::InvocationFailed {
            capability: name.to_string(),
            attempts,
            last_error,
        })
    }
}
