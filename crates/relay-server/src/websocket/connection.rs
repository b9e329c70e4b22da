//! Per-client connection handle.

use relay_core::{ConnectionId, RelayError, Result};
use tokio::sync::mpsc;

use crate::protocol::Frame;

/// Send side of one connected client.
///
/// Frames go onto a bounded queue that the session's writer task drains into
/// the transport. The handle never closes the transport itself; dropping the
/// writer (on session end) makes every later [`send`](Self::send) fail.
#[derive(Debug)]
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Transport-level peer address.
    pub remote_addr: String,
    tx: mpsc::Sender<Frame>,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, remote_addr: impl Into<String>, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            remote_addr: remote_addr.into(),
            tx,
        }
    }

    /// Enqueue a frame, waiting for queue capacity if the client is behind.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| RelayError::ConnectionClosed(self.id.clone()))
    }
}
