//! Shared state handed to every session.

use std::sync::Arc;

use relay_core::EventLog;

use crate::config::ServerConfig;
use crate::websocket::broadcast::Broadcaster;
use crate::websocket::registry::Registry;

/// Process-wide relay state. Cheap to clone; every field is shared.
#[derive(Clone, Debug)]
pub struct RelayContext {
    /// Authenticated membership.
    pub registry: Arc<Registry>,
    /// Fan-out over `registry`.
    pub broadcaster: Broadcaster,
    /// Connect/message/disconnect history.
    pub events: Arc<EventLog>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl RelayContext {
    /// Fresh, empty relay state.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
            events: Arc::new(EventLog::new()),
            config: Arc::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let ctx = RelayContext::new(ServerConfig::default());
        assert_eq!(ctx.registry.count(), 0);
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn clones_share_state() {
        let ctx = RelayContext::new(ServerConfig::default());
        let other = ctx.clone();
        other.events.append(relay_core::LogEntry::disconnect("x"));
        assert_eq!(ctx.events.len(), 1);
        assert!(Arc::ptr_eq(&ctx.registry, &other.registry));
    }
}
