//! Connection manager: the only owner of tool-server sessions.
//!
//! State lives behind one async mutex that is held for transitions only,
//! never while a handshake is in flight or a transport is closing. A connect
//! records which attempt it is; when the handshake finishes, the session is
//! kept only if that attempt is still the current one. `disconnect_all`
//! clears every attempt, so a connect that straddles it closes what it opened
//! and reports `Abandoned`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tether_types::ToolDefinition;
use tokio::sync::Mutex;

use crate::config::ServerDescriptor;
use crate::connector::Connector;
use crate::error::McpError;
use crate::probe::{Availability, AvailabilityStatus, DEFAULT_PROBE_TIMEOUT};
use crate::registry::{Capability, CapabilityRegistry};
use crate::session::ServerSession;

enum ConnectionState {
    Disconnected,
    Connecting { attempt: u64 },
    Connected(Arc<ServerSession>),
}

/// Observable connection status of one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        })
    }
}

#[derive(Default)]
struct ManagerState {
    connections: HashMap<String, ConnectionState>,
    registry: CapabilityRegistry,
    /// Advanced on every connect attempt and every `disconnect_all`.
    generation: u64,
}

impl ManagerState {
    fn status(&self, name: &str) -> ConnectionStatus {
        match self.connections.get(name) {
            None | Some(ConnectionState::Disconnected) => ConnectionStatus::Disconnected,
            Some(ConnectionState::Connecting { .. }) => ConnectionStatus::Connecting,
            Some(ConnectionState::Connected(_)) => ConnectionStatus::Connected,
        }
    }
}

pub struct ConnectionManager {
    descriptors: Vec<ServerDescriptor>,
    connector: Arc<dyn Connector>,
    state: Mutex<ManagerState>,
}

impl ConnectionManager {
    pub fn new(descriptors: Vec<ServerDescriptor>, connector: Arc<dyn Connector>) -> Self {
        Self {
            descriptors,
            connector,
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn descriptors(&self) -> &[ServerDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, name: &str) -> Result<&ServerDescriptor, McpError> {
        self.descriptors
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| McpError::UnknownServer {
                name: name.to_string(),
            })
    }

    /// Connect to `name`. Connecting an already connected server succeeds
    /// without doing anything.
    pub async fn connect(&self, name: &str) -> Result<(), McpError> {
        let descriptor = self.descriptor(name)?;
        if !descriptor.enabled {
            return Err(McpError::ServerDisabled {
                name: name.to_string(),
            });
        }

        let attempt = {
            let mut state = self.state.lock().await;
            match state.connections.get(name) {
                Some(ConnectionState::Connected(_)) => return Ok(()),
                Some(ConnectionState::Connecting { .. }) => {
                    return Err(McpError::ConnectInProgress {
                        name: name.to_string(),
                    });
                }
                None | Some(ConnectionState::Disconnected) => {}
            }
            state.generation += 1;
            let attempt = state.generation;
            state
                .connections
                .insert(name.to_string(), ConnectionState::Connecting { attempt });
            attempt
        };

        tracing::debug!("Connecting to MCP server '{name}' ({})", descriptor.endpoint);
        let opened = self.open_session(descriptor).await;

        let mut state = self.state.lock().await;
        let current = matches!(
            state.connections.get(name),
            Some(ConnectionState::Connecting { attempt: a }) if *a == attempt
        );

        match opened {
            Ok(session) if current => {
                let session = Arc::new(session);
                state
                    .registry
                    .register(name, session.capabilities().to_vec());
                state
                    .connections
                    .insert(name.to_string(), ConnectionState::Connected(session));
                Ok(())
            }
            Ok(session) => {
                drop(state);
                tracing::info!("Connect to '{name}' was overtaken by a disconnect, closing it");
                session.close().await;
                Err(McpError::Abandoned {
                    name: name.to_string(),
                })
            }
            Err(e) => {
                if current {
                    state
                        .connections
                        .insert(name.to_string(), ConnectionState::Disconnected);
                }
                tracing::warn!("Failed to connect to MCP server '{name}': {e}");
                Err(match e {
                    McpError::ConnectionFailed { .. } => e,
                    other => McpError::ConnectionFailed {
                        server: name.to_string(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Check availability first so an unreachable endpoint fails within
    /// `DEFAULT_PROBE_TIMEOUT` instead of the request timeout. An inconclusive
    /// check goes ahead.
    async fn open_session(&self, descriptor: &ServerDescriptor) -> Result<ServerSession, McpError> {
        let availability = self.connector.probe(descriptor, DEFAULT_PROBE_TIMEOUT).await;
        if availability.status == AvailabilityStatus::Unavailable {
            return Err(McpError::ConnectionFailed {
                server: descriptor.name.clone(),
                reason: format!("{} ({})", availability.status, availability.diagnostic),
            });
        }
        tracing::debug!(
            "Availability of '{}': {} in {}ms",
            descriptor.name,
            availability.status,
            availability.latency.as_millis()
        );

        let transport = self.connector.open(descriptor).await?;
        ServerSession::open(descriptor.clone(), transport).await
    }

    /// Disconnect `name`. A server that is not connected is left alone and the
    /// call still succeeds; a pending connect is abandoned.
    ///
    /// The entry leaves `Connected` and the session is signalled under the
    /// lock, so nothing can resolve to it any more. The transport is released
    /// with the lock dropped, then the capabilities are removed.
    pub async fn disconnect(&self, name: &str) -> Result<(), McpError> {
        self.descriptor(name)?;
        let session = {
            let mut state = self.state.lock().await;
            match state
                .connections
                .insert(name.to_string(), ConnectionState::Disconnected)
            {
                Some(ConnectionState::Connected(session)) => {
                    session.signal_closed();
                    session
                }
                _ => return Ok(()),
            }
        };

        session.close().await;

        let mut state = self.state.lock().await;
        // A reconnect that finished meanwhile registered its own list.
        if !matches!(state.connections.get(name), Some(ConnectionState::Connected(_))) {
            state.registry.unregister(name);
        }
        tracing::info!("Disconnected from MCP server '{name}'");
        Ok(())
    }

    /// Close every session and clear the registry. Connects still in flight
    /// are abandoned. Returns how many sessions were closed.
    pub async fn disconnect_all(&self) -> usize {
        let sessions: Vec<Arc<ServerSession>> = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            let previous = std::mem::take(&mut state.connections);
            state.registry.clear();
            previous
                .into_values()
                .filter_map(|conn| match conn {
                    ConnectionState::Connected(session) => Some(session),
                    _ => None,
                })
                .inspect(|session| session.signal_closed())
                .collect()
        };

        join_all(sessions.iter().map(|session| session.close())).await;
        if !sessions.is_empty() {
            tracing::info!("Disconnected {} MCP server(s)", sessions.len());
        }
        sessions.len()
    }

    /// Connected servers in connection order.
    pub async fn list_connected(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .registry
            .servers()
            .filter(|server| state.status(server) == ConnectionStatus::Connected)
            .map(str::to_string)
            .collect()
    }

    pub async fn status(&self, name: &str) -> ConnectionStatus {
        self.state.lock().await.status(name)
    }

    /// Probe `name` without connecting.
    pub async fn check_availability(&self, name: &str, timeout: Duration) -> Result<Availability, McpError> {
        let descriptor = self.descriptor(name)?;
        Ok(self.connector.probe(descriptor, timeout).await)
    }

    /// Every registered capability paired with its server, shadowed ones included.
    pub async fn capabilities(&self) -> Vec<(String, Capability)> {
        let state = self.state.lock().await;
        state
            .registry
            .all_capabilities()
            .map(|(server, cap)| (server.to_string(), cap.clone()))
            .collect()
    }

    /// The owning server's version of capability `name`.
    pub async fn capability(&self, name: &str) -> Option<Capability> {
        self.state.lock().await.registry.capability(name).cloned()
    }

    /// Definitions for the completion API, one per name.
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        self.state.lock().await.registry.definitions()
    }

    /// The server that currently owns capability `name`.
    pub async fn resolve(&self, name: &str) -> Result<String, McpError> {
        let state = self.state.lock().await;
        state
            .registry
            .resolve(name)
            .map(str::to_string)
            .ok_or_else(|| McpError::CapabilityNotFound {
                name: name.to_string(),
            })
    }

    /// The live session owning capability `name`.
    pub(crate) async fn session_for(&self, name: &str) -> Result<Arc<ServerSession>, McpError> {
        let state = self.state.lock().await;
        let not_found = || McpError::CapabilityNotFound {
            name: name.to_string(),
        };
        let server = state.registry.resolve(name).ok_or_else(not_found)?;
        match state.connections.get(server) {
            Some(ConnectionState::Connected(session)) => Ok(Arc::clone(session)),
            _ => Err(not_found()),
        }
    }
}
