//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why the relay could not assemble its settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read relay settings at {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The settings file is not valid JSON, or has the wrong shape.
    #[error("relay settings at {} are malformed: {source}", path.display())]
    Malformed {
        /// File that was being parsed.
        path: PathBuf,
        /// Parser error, with line and column.
        source: serde_json::Error,
    },
    /// The merged settings tree no longer fits `RelaySettings`.
    #[error("merged relay settings do not deserialize: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value parsed but is unusable for the relay.
    #[error("relay setting `{field}` {reason}")]
    Invalid {
        /// Dotted camelCase key, e.g. `server.host`.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/relay/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/relay/settings.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn malformed_error_keeps_parser_position() {
        let source = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err = SettingsError::Malformed {
            path: PathBuf::from("settings.json"),
            source,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("relay settings at settings.json are malformed"));
        assert!(msg.contains("line 1"));
    }

    #[test]
    fn invalid_names_the_field() {
        let err = SettingsError::Invalid {
            field: "server.sendQueueCapacity",
            reason: "must be at least 1",
        };
        assert_eq!(
            err.to_string(),
            "relay setting `server.sendQueueCapacity` must be at least 1"
        );
    }
}
