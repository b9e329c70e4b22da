//! Fan-out to registered connections.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use relay_core::ConnectionId;
use tracing::{debug, warn};

use super::registry::Registry;
use crate::metrics::{BROADCAST_FAILURES_TOTAL, BROADCASTS_TOTAL};
use crate::protocol::Frame;

/// Outcome of one broadcast call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Targets in the snapshot.
    pub recipients: usize,
    /// Targets whose send failed (already disconnected).
    pub failed: usize,
}

impl BroadcastReport {
    /// Targets that accepted the frame.
    pub fn delivered(&self) -> usize {
        self.recipients - self.failed
    }
}

/// Sends one frame to every registered connection but an optional excluded one.
#[derive(Clone, Debug)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// Create a broadcaster over `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Fan `frame` out to a snapshot of the registry.
    ///
    /// All sends run concurrently and this returns once each has finished
    /// or failed, so a slow peer delays only its own delivery. Failures are
    /// counted in the report and never returned as errors. A caller that
    /// awaits one broadcast before starting the next gets its frames queued in
    /// that order at every common recipient.
    pub async fn broadcast(&self, frame: Frame, exclude: Option<&ConnectionId>) -> BroadcastReport {
        let targets = self.registry.snapshot_targets(exclude);
        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let sends = targets.iter().map(|conn| {
            let frame = Arc::clone(&frame);
            async move { (conn, conn.send(frame).await) }
        });

        let mut report = BroadcastReport {
            recipients: targets.len(),
            failed: 0,
        };
        for (conn, result) in join_all(sends).await {
            if let Err(e) = result {
                report.failed += 1;
                if e.is_disconnect() {
                    debug!(conn_id = %conn.id, error = %e, "broadcast target gone");
                } else {
                    warn!(conn_id = %conn.id, error = %e, "broadcast send failed");
                }
            }
        }

        counter!(BROADCASTS_TOTAL).increment(1);
        if report.failed > 0 {
            counter!(BROADCAST_FAILURES_TOTAL).increment(report.failed as u64);
        }
        debug!(
            recipients = report.recipients,
            delivered = report.delivered(),
            failed = report.failed,
            "broadcast frame"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    use crate::websocket::connection::ClientConnection;
    use crate::websocket::registry::NodeInfo;

    fn add(registry: &Registry, id: &str, capacity: usize) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Arc::new(ClientConnection::new(ConnectionId::from(id), "127.0.0.1:1", tx));
        let _ = registry.register(conn, NodeInfo::new(id, "127.0.0.1:1")).unwrap();
        rx
    }

    fn frame(text: &str) -> Frame {
        Arc::from(text)
    }

    #[tokio::test]
    async fn empty_registry_is_noop() {
        let bm = Broadcaster::new(Arc::new(Registry::new()));
        let report = bm.broadcast(frame("x"), None).await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn excluded_sender_receives_nothing() {
        let registry = Arc::new(Registry::new());
        let mut ra = add(&registry, "a", 8);
        let mut rb = add(&registry, "b", 8);
        let mut rc = add(&registry, "c", 8);
        let bm = Broadcaster::new(Arc::clone(&registry));

        let report = bm.broadcast(frame("hi"), Some(&ConnectionId::from("a"))).await;
        assert_eq!(report.recipients, 2);
        assert_eq!(report.delivered(), 2);
        assert!(ra.try_recv().is_err());
        assert_eq!(&*rb.try_recv().unwrap(), "hi");
        assert_eq!(&*rc.try_recv().unwrap(), "hi");
    }

    #[tokio::test]
    async fn no_exclusion_reaches_everyone() {
        let registry = Arc::new(Registry::new());
        let mut ra = add(&registry, "a", 8);
        let mut rb = add(&registry, "b", 8);
        let bm = Broadcaster::new(Arc::clone(&registry));

        let _ = bm.broadcast(frame("bye"), None).await;
        assert!(ra.try_recv().is_ok());
        assert!(rb.try_recv().is_ok());
    }

    #[tokio::test]
    async fn failed_target_does_not_abort_batch() {
        let registry = Arc::new(Registry::new());
        let gone = add(&registry, "gone", 8);
        drop(gone);
        let mut alive = add(&registry, "alive", 8);
        let bm = Broadcaster::new(Arc::clone(&registry));

        let report = bm.broadcast(frame("m"), None).await;
        assert_eq!(report.recipients, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(&*alive.try_recv().unwrap(), "m");
    }

    #[tokio::test]
    async fn slow_peer_does_not_delay_others() {
        let registry = Arc::new(Registry::new());
        let mut slow = add(&registry, "slow", 1);
        let mut fast = add(&registry, "fast", 8);
        let bm = Broadcaster::new(Arc::clone(&registry));

        // fill the slow peer's queue
        let _ = bm.broadcast(frame("m1"), None).await;
        assert_eq!(&*fast.recv().await.unwrap(), "m1");

        let pending = tokio::spawn({
            let bm = bm.clone();
            async move { bm.broadcast(frame("m2"), None).await }
        });

        let got = tokio::time::timeout(Duration::from_secs(1), fast.recv()).await.unwrap();
        assert_eq!(&*got.unwrap(), "m2");
        assert!(!pending.is_finished());

        assert_eq!(&*slow.recv().await.unwrap(), "m1");
        let report = pending.await.unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(&*slow.recv().await.unwrap(), "m2");
    }

    #[tokio::test]
    async fn sequential_broadcasts_keep_order() {
        let registry = Arc::new(Registry::new());
        let _sender = add(&registry, "s", 8);
        let mut r1 = add(&registry, "r1", 64);
        let mut r2 = add(&registry, "r2", 64);
        let bm = Broadcaster::new(Arc::clone(&registry));
        let sender = ConnectionId::from("s");

        for i in 0..20 {
            let _ = bm.broadcast(Arc::from(format!("m{i}")), Some(&sender)).await;
        }
        for i in 0..20 {
            assert_eq!(&*r1.recv().await.unwrap(), format!("m{i}"));
            assert_eq!(&*r2.recv().await.unwrap(), format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn frame_is_shared_not_copied() {
        let registry = Arc::new(Registry::new());
        let mut ra = add(&registry, "a", 8);
        let mut rb = add(&registry, "b", 8);
        let bm = Broadcaster::new(Arc::clone(&registry));

        let _ = bm.broadcast(frame("shared"), None).await;
        let a = ra.recv().await.unwrap();
        let b = rb.recv().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
