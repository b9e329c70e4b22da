//! Append-only event log.
//!
//! Records one entry per connect, relayed message, and disconnect for the
//! lifetime of the process. Nothing reads entries back on the hot path; the
//! log exists for observability (the `/health` counter, tests). Growth is
//! unbounded and there is no persistence.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// Current time as an RFC 3339 string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One structured event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum LogEntry {
    /// A node authenticated.
    Conexion {
        /// Display name of the node.
        nodo: String,
        /// When the node authenticated.
        timestamp: String,
        /// Transport-level peer address.
        address: String,
    },
    /// A node sent a frame that was relayed.
    Mensaje {
        /// Display name of the sender.
        nodo: String,
        /// Decoded frame content.
        contenido: Value,
        /// When the frame was received.
        timestamp: String,
    },
    /// A registered node left.
    Desconexion {
        /// Display name of the node.
        nodo: String,
        /// When the node was unregistered.
        timestamp: String,
    },
}

impl LogEntry {
    /// Connect entry stamped with the current time.
    pub fn connect(node: impl Into<String>, address: impl Into<String>) -> Self {
        Self::Conexion {
            nodo: node.into(),
            timestamp: now_timestamp(),
            address: address.into(),
        }
    }

    /// Message entry stamped with the current time.
    pub fn message(node: impl Into<String>, content: Value) -> Self {
        Self::Mensaje {
            nodo: node.into(),
            contenido: content,
            timestamp: now_timestamp(),
        }
    }

    /// Disconnect entry stamped with the current time.
    pub fn disconnect(node: impl Into<String>) -> Self {
        Self::Desconexion {
            nodo: node.into(),
            timestamp: now_timestamp(),
        }
    }

    /// Node name carried by every variant.
    pub fn node_name(&self) -> &str {
        match self {
            Self::Conexion { nodo, .. } | Self::Mensaje { nodo, .. } | Self::Desconexion { nodo, .. } => {
                nodo
            }
        }
    }

    /// Short label for the variant, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conexion { .. } => "conexion",
            Self::Mensaje { .. } => "mensaje",
            Self::Desconexion { .. } => "desconexion",
        }
    }
}

/// Process-lifetime, ordered, append-only sequence of [`LogEntry`].
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry at the end of the log.
    pub fn append(&self, entry: LogEntry) {
        tracing::trace!(kind = entry.kind(), node = entry.node_name(), "event logged");
        self.entries.lock().push(entry);
    }

    /// Number of entries recorded so far.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Point-in-time copy of every entry, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }
}
