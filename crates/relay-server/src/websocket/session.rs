//! Per-connection lifecycle, from upgrade through disconnect.
//!
//! A [`Session`] moves through `AwaitingAuth → Authenticated → Closed` and
//! nothing else. [`run_session`] drives one over any frame stream and sink.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge};
use relay_core::{ConnectionId, LogEntry, RelayError};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::connection::ClientConnection;
use super::registry::NodeInfo;
use crate::context::RelayContext;
use crate::metrics::{CONNECTIONS_TOTAL, MALFORMED_FRAMES_TOTAL, MESSAGES_RELAYED_TOTAL, NODES_ACTIVE};
use crate::protocol::{AuthRequest, Frame, ServerMessage, decode_payload};

/// Upper bound on draining the writer and on the close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a session is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first frame.
    AwaitingAuth,
    /// Registered under `name`.
    Authenticated {
        /// Display name taken from the auth frame.
        name: String,
    },
    /// Terminal.
    Closed,
}

/// One connection's protocol state.
///
/// Cleanup runs exactly once: through [`close`](Self::close) on every normal
/// exit path, or through `Drop` if the owning task is cancelled first.
#[derive(Debug)]
pub struct Session {
    connection: Arc<ClientConnection>,
    ctx: RelayContext,
    state: SessionState,
}

impl Session {
    /// A session awaiting its auth frame.
    pub fn new(connection: Arc<ClientConnection>, ctx: RelayContext) -> Self {
        Self {
            connection,
            ctx,
            state: SessionState::AwaitingAuth,
        }
    }

    /// This connection's ID.
    pub fn id(&self) -> &ConnectionId {
        &self.connection.id
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Name the node registered under, once authenticated.
    pub fn node_name(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { name } => Some(name),
            _ => None,
        }
    }

    /// Handle the first inbound frame.
    ///
    /// On a valid auth frame the connection is registered and the `auth_ok`
    /// frame is returned for the caller to write directly to the transport.
    /// Anything else (no frame, undecodable, not an auth request) moves to
    /// `Closed` without touching the registry or the event log.
    pub fn authenticate(&mut self, frame: Option<&str>) -> Option<Frame> {
        if self.state != SessionState::AwaitingAuth {
            return None;
        }

        let request = match frame.map(AuthRequest::decode) {
            Some(Ok(Some(request))) => request,
            Some(Ok(None)) => {
                debug!("first frame is not an auth request, closing");
                self.state = SessionState::Closed;
                return None;
            }
            Some(Err(e)) => {
                debug!(error = %e, "undecodable first frame, closing");
                self.state = SessionState::Closed;
                return None;
            }
            None => {
                debug!("peer left before authenticating");
                self.state = SessionState::Closed;
                return None;
            }
        };

        let remote_addr = &self.connection.remote_addr;
        let info = NodeInfo::new(request.name.clone(), remote_addr.clone());
        let total = match self.ctx.registry.register(Arc::clone(&self.connection), info) {
            Ok(total) => total,
            Err(e) => {
                warn!(error = %e, "registration rejected");
                self.state = SessionState::Closed;
                return None;
            }
        };
        record_active(total);
        self.ctx
            .events
            .append(LogEntry::connect(request.name.clone(), remote_addr.clone()));
        info!(node = %request.name, remote_addr = %remote_addr, total, "node connected");

        let ack = ServerMessage::auth_ok(&request.name, total).to_frame();
        self.state = SessionState::Authenticated { name: request.name };
        match ack {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!(error = %e, "failed to encode auth_ok");
                None
            }
        }
    }

    /// Tell every other node that this one joined.
    pub async fn announce_join(&self) {
        let Some(name) = self.node_name() else { return };
        let total = self.ctx.registry.count();
        self.broadcast(&ServerMessage::node_connected(name, total), Some(self.id()))
            .await;
    }

    /// Relay one inbound frame to every other node.
    ///
    /// Non-JSON text is dropped with a warning; the connection stays open.
    pub async fn relay(&self, text: &str) {
        let Some(name) = self.node_name() else { return };
        let Ok(content) = decode_payload(text) else {
            self.reject_malformed(text);
            return;
        };

        debug!(node = %name, content = %content, "relaying message");
        self.ctx
            .events
            .append(LogEntry::message(name, content.clone()));
        counter!(MESSAGES_RELAYED_TOTAL).increment(1);
        self.broadcast(&ServerMessage::relayed(name, content), Some(self.id()))
            .await;
    }

    /// Drop a frame that could not be decoded.
    pub fn reject_malformed(&self, raw: &str) {
        let node = self.node_name().unwrap_or_default();
        warn!(node, raw, "dropping non-JSON frame");
        counter!(MALFORMED_FRAMES_TOTAL).increment(1);
    }

    /// Enter `Closed`, announcing the departure if this node was registered.
    ///
    /// Calling it again is a no-op.
    pub async fn close(&mut self) {
        if let Some(frame) = self.finish() {
            let _ = self.ctx.broadcaster.broadcast(frame, None).await;
        }
    }

    /// Synchronous half of cleanup. Returns the leave notice to broadcast.
    fn finish(&mut self) -> Option<Frame> {
        let SessionState::Authenticated { name } =
            std::mem::replace(&mut self.state, SessionState::Closed)
        else {
            return None;
        };
        let (_, total) = self.ctx.registry.unregister(self.id())?;
        record_active(total);
        self.ctx.events.append(LogEntry::disconnect(name.clone()));
        info!(node = %name, total, "node disconnected");

        match ServerMessage::node_disconnected(&name, total).to_frame() {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!(error = %e, "failed to encode nodo_desconectado");
                None
            }
        }
    }

    async fn broadcast(&self, message: &ServerMessage, exclude: Option<&ConnectionId>) {
        match message.to_frame() {
            Ok(frame) => {
                let _ = self.ctx.broadcaster.broadcast(frame, exclude).await;
            }
            Err(e) => error!(kind = message.kind(), error = %e, "failed to encode frame"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(frame) = self.finish() else { return };
        let broadcaster = self.ctx.broadcaster.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let _ = handle.spawn(async move {
                    let _ = broadcaster.broadcast(frame, None).await;
                });
            }
            Err(_) => warn!("no runtime to deliver leave notice"),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(total: usize) {
    gauge!(NODES_ACTIVE).set(total as f64);
}

enum Inbound {
    Text(String),
    Malformed(String),
    Closed,
}

/// Next data frame, skipping control frames.
async fn next_inbound<R, E>(inbound: &mut R) -> Inbound
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        let msg = match inbound.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                let err = RelayError::Transport(e.to_string());
                debug!(error = %err, "inbound closed");
                return Inbound::Closed;
            }
            None => return Inbound::Closed,
        };
        match msg {
            Message::Text(text) => return Inbound::Text(text.as_str().to_owned()),
            // Some clients send JSON as binary frames
            Message::Binary(data) => {
                return match std::str::from_utf8(&data) {
                    Ok(text) => Inbound::Text(text.to_owned()),
                    Err(_) => Inbound::Malformed(String::from_utf8_lossy(&data).into_owned()),
                };
            }
            Message::Close(_) => {
                debug!("peer sent close frame");
                return Inbound::Closed;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

/// Run one connection to completion.
///
/// `inbound` and `outbound` are the two halves of the transport. The first
/// frame must authenticate; `auth_ok` is written straight to `outbound`
/// before anything queued by broadcasts, then a writer task drains the
/// connection's queue until the session ends.
pub async fn run_session<R, W, E>(inbound: R, outbound: W, remote_addr: String, ctx: RelayContext)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: fmt::Display,
    E: fmt::Display,
{
    let conn_id = ConnectionId::new();
    let span = info_span!("session", conn_id = %conn_id, remote_addr = %remote_addr);
    drive(inbound, outbound, conn_id, remote_addr, ctx)
        .instrument(span)
        .await;
}

async fn drive<R, W, E>(
    mut inbound: R,
    mut outbound: W,
    conn_id: ConnectionId,
    remote_addr: String,
    ctx: RelayContext,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: fmt::Display,
    E: fmt::Display,
{
    counter!(CONNECTIONS_TOTAL).increment(1);
    debug!("connection opened");

    let (tx, mut rx) = mpsc::channel::<Frame>(ctx.config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(conn_id, remote_addr, tx));
    let mut session = Session::new(connection, ctx);

    let first = match next_inbound(&mut inbound).await {
        Inbound::Text(text) => Some(text),
        Inbound::Malformed(_) => {
            debug!("non-UTF-8 first frame");
            None
        }
        Inbound::Closed => None,
    };
    let Some(ack) = session.authenticate(first.as_deref()) else {
        session.close().await;
        close_outbound(&mut outbound).await;
        return;
    };
    if let Err(e) = outbound.send(Message::Text(ack.to_string().into())).await {
        let err = RelayError::Transport(e.to_string());
        debug!(error = %err, "failed to deliver auth_ok");
        session.close().await;
        close_outbound(&mut outbound).await;
        return;
    }

    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let mut writer = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    biased;
                    frame = rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = outbound.send(Message::Text(frame.to_string().into())).await {
                            let err = RelayError::Transport(e.to_string());
                            debug!(error = %err, "outbound closed");
                            break;
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
            outbound
        }
        .in_current_span(),
    );

    session.announce_join().await;

    let relay_loop = async {
        loop {
            match next_inbound(&mut inbound).await {
                Inbound::Text(text) => session.relay(&text).await,
                Inbound::Malformed(raw) => session.reject_malformed(&raw),
                Inbound::Closed => break,
            }
        }
    };
    match AssertUnwindSafe(relay_loop).catch_unwind().await {
        Ok(()) => info!("connection closed"),
        Err(_) => error!("relay loop panicked, closing connection"),
    }

    session.close().await;

    // Frames already queued go out before the close frame.
    let _ = stop_tx.send(());
    match tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await {
        Ok(Ok(mut outbound)) => close_outbound(&mut outbound).await,
        Ok(Err(e)) => debug!(error = %e, "writer task failed"),
        Err(_) => {
            debug!("writer did not drain in time");
            writer.abort();
        }
    }
}

/// Finish the close handshake on the outbound half.
async fn close_outbound<W>(outbound: &mut W)
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    match tokio::time::timeout(CLOSE_TIMEOUT, outbound.close()).await {
        Ok(Ok(())) => debug!("outbound closed cleanly"),
        Ok(Err(e)) => {
            let err = RelayError::Transport(e.to_string());
            debug!(error = %err, "close handshake failed");
        }
        Err(_) => debug!("close handshake timed out"),
    }
}
