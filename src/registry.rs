//! Provider lookup by type tag and the ordered set of configured connections.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionId};
use crate::process::Provider;

/// Maps provider-type tags to providers and holds connections in insertion order.
///
/// Read-only once the [`Relay`](crate::Relay) is built, so concurrent sends share it
/// without locking.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    connections: Vec<Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its slug. A later registration with the same slug wins.
    pub fn register_provider(&mut self, provider: Arc<dyn Provider>) {
        let slug = provider.slug().to_string();
        if self.providers.insert(slug.clone(), provider).is_some() {
            tracing::warn!(provider = %slug, "Replacing registered provider");
        }
    }

    /// Add a connection. A connection with an existing id replaces it in place.
    pub fn add_connection(&mut self, connection: Connection) {
        match self
            .connections
            .iter_mut()
            .find(|c| c.id == connection.id)
        {
            Some(existing) => *existing = connection,
            None => self.connections.push(connection),
        }
    }

    pub fn provider(&self, slug: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(slug).cloned()
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| &c.id == id)
    }

    /// First connection by insertion order.
    pub fn first_connection(&self) -> Option<&Connection> {
        self.connections.first()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// The provider registered for a connection's `mailer` tag.
    pub fn provider_for(&self, connection: &Connection) -> Option<Arc<dyn Provider>> {
        self.provider(&connection.mailer)
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<_> = self.providers.keys().collect();
        providers.sort();
        f.debug_struct("ConnectionRegistry")
            .field("providers", &providers)
            .field("connections", &self.connections)
            .finish()
    }
}
