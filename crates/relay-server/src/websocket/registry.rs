//! Registry of authenticated connections.
//!
//! The single source of truth for "who is connected". A connection appears
//! here only between a successful auth and its session's cleanup. Every
//! operation takes one short `parking_lot` lock and never awaits while holding
//! it, so enumerating members can't stall on a slow peer.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_core::{ConnectionId, RelayError, Result};

use super::connection::ClientConnection;

/// Metadata recorded for a node at auth time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    /// Display name. Not unique.
    pub name: String,
    /// When the node authenticated.
    pub connected_at: DateTime<Utc>,
    /// Transport-level peer address.
    pub remote_address: String,
}

impl NodeInfo {
    /// Metadata for `name` stamped with the current time.
    pub fn new(name: impl Into<String>, remote_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected_at: Utc::now(),
            remote_address: remote_address.into(),
        }
    }
}

#[derive(Debug)]
struct Member {
    connection: Arc<ClientConnection>,
    info: NodeInfo,
}

/// Live membership map.
#[derive(Debug, Default)]
pub struct Registry {
    members: Mutex<HashMap<ConnectionId, Member>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an authenticated connection.
    ///
    /// Returns the membership count right after insertion. A second
    /// registration of the same ID is rejected and leaves the first intact.
    pub fn register(&self, connection: Arc<ClientConnection>, info: NodeInfo) -> Result<usize> {
        let mut members = self.members.lock();
        match members.entry(connection.id.clone()) {
            Entry::Occupied(_) => Err(RelayError::DuplicateRegistration(connection.id.clone())),
            Entry::Vacant(slot) => {
                let _ = slot.insert(Member { connection, info });
                Ok(members.len())
            }
        }
    }

    /// Remove a connection, returning its metadata and the remaining count.
    ///
    /// Removing an absent ID is a no-op that returns `None`.
    pub fn unregister(&self, id: &ConnectionId) -> Option<(NodeInfo, usize)> {
        let mut members = self.members.lock();
        let member = members.remove(id)?;
        Some((member.info, members.len()))
    }

    /// Point-in-time copy of every registered connection except `exclude`.
    pub fn snapshot_targets(&self, exclude: Option<&ConnectionId>) -> Vec<Arc<ClientConnection>> {
        self.members
            .lock()
            .iter()
            .filter(|(id, _)| Some(*id) != exclude)
            .map(|(_, m)| Arc::clone(&m.connection))
            .collect()
    }

    /// Current membership size.
    pub fn count(&self) -> usize {
        self.members.lock().len()
    }
}
