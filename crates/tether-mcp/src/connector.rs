//! How descriptors become transports.

use std::time::Duration;

use crate::config::{Endpoint, ServerDescriptor};
use crate::error::McpError;
use crate::probe::{self, Availability};
use crate::transport::{BoxFuture, HttpTransport, StdioTransport, Transport};

/// Opens transports and probes endpoints. The manager only talks to servers
/// through this seam.
pub trait Connector: Send + Sync {
    fn open<'a>(
        &'a self,
        descriptor: &'a ServerDescriptor,
    ) -> BoxFuture<'a, Result<Box<dyn Transport>, McpError>>;

    fn probe<'a>(
        &'a self,
        descriptor: &'a ServerDescriptor,
        timeout: Duration,
    ) -> BoxFuture<'a, Availability>;
}

/// Streamable HTTP for `http(s)://` endpoints, child processes for commands.
#[derive(Clone)]
pub struct DefaultConnector {
    http: reqwest::Client,
}

impl DefaultConnector {
    pub fn new() -> Result<Self, McpError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tether/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| McpError::Protocol(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

impl Connector for DefaultConnector {
    fn open<'a>(
        &'a self,
        descriptor: &'a ServerDescriptor,
    ) -> BoxFuture<'a, Result<Box<dyn Transport>, McpError>> {
        Box::pin(async move {
            let transport: Box<dyn Transport> = match &descriptor.endpoint {
                Endpoint::Http { url } => Box::new(HttpTransport::new(
                    &descriptor.name,
                    url,
                    self.http.clone(),
                    descriptor.timeout_ms,
                )),
                Endpoint::Stdio { command, args, env } => Box::new(StdioTransport::spawn(
                    &descriptor.name,
                    command,
                    args,
                    env,
                    descriptor.timeout_ms,
                )?),
            };
            Ok(transport)
        })
    }

    fn probe<'a>(
        &'a self,
        descriptor: &'a ServerDescriptor,
        timeout: Duration,
    ) -> BoxFuture<'a, Availability> {
        Box::pin(probe::probe(&self.http, descriptor, timeout))
    }
}
