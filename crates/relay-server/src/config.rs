//! Server configuration.

use relay_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8765`, `0` for auto-assign).
    pub port: u16,
    /// Frames buffered per connection before broadcasters wait.
    pub send_queue_capacity: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8765,
            send_queue_capacity: 1024,
            max_message_size: 1 << 20, // 1 MiB
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            send_queue_capacity: s.send_queue_capacity.max(1),
            max_message_size: s.max_message_size,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_all_interfaces_on_8765() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8765");
    }

    #[test]
    fn default_queue_and_message_size() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.send_queue_capacity, 1024);
        assert_eq!(cfg.max_message_size, 1 << 20);
    }

    #[test]
    fn from_settings() {
        let settings = ServerSettings {
            host: "127.0.0.1".into(),
            port: 9001,
            send_queue_capacity: 0,
            max_message_size: 1024,
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9001");
        assert_eq!(cfg.send_queue_capacity, 1);
        assert_eq!(cfg.max_message_size, 1024);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bind_addr(), cfg.bind_addr());
    }
}
