//! Axum HTTP + WebSocket server.

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::header;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::context::RelayContext;
use crate::health::{self, HealthResponse};
use crate::websocket::session::run_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    ctx: RelayContext,
    metrics: PrometheusHandle,
    start_time: Instant,
}

/// The relay server.
pub struct RelayServer {
    ctx: RelayContext,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl RelayServer {
    /// Create a new server with empty membership.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        Self {
            ctx: RelayContext::new(config),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: self.ctx.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// Bind `host:port` and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.ctx.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "relay server listening");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "server stopped");
            }
        });
        Ok((local_addr, handle))
    }

    /// Shared relay state.
    pub fn context(&self) -> &RelayContext {
        &self.ctx
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }
}

/// GET / and GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(state.ctx.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, peer, state.ctx))
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, ctx: RelayContext) {
    let (outbound, inbound) = socket.split();
    run_session(inbound, outbound, peer.to_string(), ctx).await;
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.ctx.registry.count(),
        state.ctx.events.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics),
    )
}
