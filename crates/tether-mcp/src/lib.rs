//! Tool-server side of Tether.
//!
//! Tool servers speak MCP (JSON-RPC 2.0) over Streamable HTTP or stdio. The
//! [`ConnectionManager`] owns every session and the [`CapabilityRegistry`]
//! that maps tool names to servers; the [`Invoker`] runs calls with retry.

pub mod config;
pub mod connector;
pub mod error;
pub mod format;
pub mod invoker;
pub mod jsonrpc;
pub mod manager;
pub mod probe;
pub mod registry;
pub mod session;
pub mod transport;

pub use config::{Endpoint, McpConfig, ServerConfig, ServerDescriptor};
pub use connector::{Connector, DefaultConnector};
pub use error::McpError;
pub use format::format_tool_response;
pub use invoker::{InvocationResult, Invoker};
pub use manager::{ConnectionManager, ConnectionStatus};
pub use probe::{Availability, AvailabilityStatus, DEFAULT_PROBE_TIMEOUT};
pub use registry::{Capability, CapabilityRegistry};
pub use session::{ServerSession, ToolCallOutcome};
pub use transport::{BoxFuture, HttpTransport, StdioTransport, Transport};
