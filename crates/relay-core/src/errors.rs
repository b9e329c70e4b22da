//! Error hierarchy for the relay.
//!
//! Every failure is contained to one connection: nothing here is meant to
//! escape a handler task. [`RelayError::is_disconnect`] separates the
//! expected "peer went away" outcomes from genuine faults so callers can pick
//! a log level.

use thiserror::Error;

use crate::ids::ConnectionId;

/// Top-level error type for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A connection tried to register twice. The first registration stands.
    #[error("connection {0} is already registered")]
    DuplicateRegistration(ConnectionId),

    /// The outbound queue of a connection is closed (peer disconnected).
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// An inbound frame was not valid JSON.
    #[error("invalid JSON frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// An outbound envelope could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),

    /// The underlying transport failed to read or write.
    #[error("transport error: {0}")]
    Transport(String),
}

impl RelayError {
    /// Whether this error just means the peer is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_) | Self::Transport(_))
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_display() {
        let err = RelayError::DuplicateRegistration(ConnectionId::from("conn_1"));
        assert_eq!(err.to_string(), "connection conn_1 is already registered");
    }

    #[test]
    fn decode_display_mentions_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err = RelayError::Decode(json_err);
        assert!(err.to_string().starts_with("invalid JSON frame"));
    }

    #[test]
    fn transport_display() {
        let err = RelayError::Transport("reset by peer".into());
        assert_eq!(err.to_string(), "transport error: reset by peer");
    }

    #[test]
    fn disconnect_classification() {
        assert!(RelayError::ConnectionClosed(ConnectionId::new()).is_disconnect());
        assert!(RelayError::Transport("eof".into()).is_disconnect());
        assert!(!RelayError::DuplicateRegistration(ConnectionId::new()).is_disconnect());
        let json_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        assert!(!RelayError::Decode(json_err).is_disconnect());
    }
}
