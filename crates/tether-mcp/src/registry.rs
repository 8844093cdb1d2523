//! Capability registry: which connected server answers to which tool name.
//!
//! Servers are kept in connection order. When two servers advertise the same
//! name the most recently connected one owns it; if that server goes away the
//! name falls back to the latest remaining server that still advertises it.

use std::collections::HashMap;

use serde_json::Value;
use tether_types::ToolDefinition;

/// A tool advertised by a server.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    pub name: String,
    pub description: String,
    /// JSON Schema object (`type`, `properties`, `required`).
    pub input_schema: Value,
}

impl Capability {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Names listed under the schema's `required` array.
    pub fn required_params(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// The definition sent to the completion API.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    /// `(server, capabilities)` in connection order.
    servers: Vec<(String, Vec<Capability>)>,
    /// Capability name -> owning server.
    owners: HashMap<String, String>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `server`'s capabilities. Re-registering replaces the previous
    /// list and moves the server to the end of the connection order.
    pub fn register(&mut self, server: &str, capabilities: Vec<Capability>) {
        self.servers.retain(|(name, _)| name != server);
        for cap in &capabilities {
            if let Some(previous) = self.owners.get(&cap.name) {
                if previous != server {
                    tracing::warn!(
                        "Capability '{}' from '{server}' shadows the one from '{previous}'",
                        cap.name
                    );
                }
            }
        }
        self.servers.push((server.to_string(), capabilities));
        self.rebuild_owners();
    }

    /// Forget `server`. Returns whether it was registered.
    pub fn unregister(&mut self, server: &str) -> bool {
        let before = self.servers.len();
        self.servers.retain(|(name, _)| name != server);
        let removed = self.servers.len() != before;
        if removed {
            self.rebuild_owners();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.servers.clear();
        self.owners.clear();
    }

    fn rebuild_owners(&mut self) {
        self.owners.clear();
        // Later servers overwrite earlier ones.
        for (server, capabilities) in &self.servers {
            for cap in capabilities {
                self.owners.insert(cap.name.clone(), server.clone());
            }
        }
    }

    /// The server currently owning `name`.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.owners.get(name).map(String::as_str)
    }

    /// The owning server's version of capability `name`.
    pub fn capability(&self, name: &str) -> Option<&Capability> {
        let owner = self.resolve(name)?;
        self.servers
            .iter()
            .find(|(server, _)| server == owner)
            .and_then(|(_, caps)| caps.iter().find(|c| c.name == name))
    }

    /// Every registered capability with its server, in connection order then
    /// advertisement order. Shadowed entries are included.
    pub fn all_capabilities(&self) -> impl Iterator<Item = (&str, &Capability)> {
        self.servers
            .iter()
            .flat_map(|(server, caps)| caps.iter().map(move |c| (server.as_str(), c)))
    }

    /// One definition per name, taken from the owner.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.all_capabilities()
            .filter(|(server, cap)| self.resolve(&cap.name) == Some(*server))
            .map(|(_, cap)| cap.to_definition())
            .collect()
    }

    /// Registered servers in connection order.
    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
