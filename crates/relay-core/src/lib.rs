//! # relay-core
//!
//! Foundation types shared by every relay crate:
//!
//! - **Connection IDs**: [`ConnectionId`], the registry key for one transport connection
//! - **Errors**: [`RelayError`] hierarchy via `thiserror`
//! - **Event log**: [`EventLog`], the append-only connect/message/disconnect history
//! - **Logging**: [`logging::init_subscriber`] for the global `tracing` subscriber

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;

pub use errors::{RelayError, Result};
pub use events::{EventLog, LogEntry};
pub use ids::ConnectionId;
