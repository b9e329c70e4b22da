//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections accepted (counter).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Authenticated nodes currently registered (gauge).
pub const NODES_ACTIVE: &str = "relay_nodes_active";
/// Frames relayed from an authenticated node (counter).
pub const MESSAGES_RELAYED_TOTAL: &str = "relay_messages_relayed_total";
/// Non-JSON frames dropped (counter).
pub const MALFORMED_FRAMES_TOTAL: &str = "relay_malformed_frames_total";
/// Broadcast calls with at least one target (counter).
pub const BROADCASTS_TOTAL: &str = "relay_broadcasts_total";
/// Per-target broadcast send failures (counter).
pub const BROADCAST_FAILURES_TOTAL: &str = "relay_broadcast_failures_total";
