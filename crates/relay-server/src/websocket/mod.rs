//! WebSocket connection management, membership, fan-out, and per-connection sessions.

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod session;
