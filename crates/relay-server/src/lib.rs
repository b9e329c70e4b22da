//! # relay-server
//!
//! Axum HTTP + `WebSocket` relay.
//!
//! - `WebSocket` gateway on `/` and `/ws`: auth handshake, then every frame is
//!   relayed to all other authenticated nodes
//! - [`websocket::registry::Registry`]: the authenticated membership map
//! - [`websocket::broadcast::Broadcaster`]: concurrent fan-out with per-target failures swallowed
//! - HTTP endpoints: `/health` and Prometheus `/metrics`

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod health;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod websocket;

pub use config::ServerConfig;
pub use context::RelayContext;
pub use server::RelayServer;
