use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::liveness::{LivenessMonitor, MonitorHandle};
use crate::registry::{Connection, Outbound, Registry};
use crate::relay::{BroadcastReport, Relay};

pub struct AppState {
    pub relay: Relay,
    pub config: RelayConfig,
    /// Parent of every connection's termination token.
    pub shutdown: CancellationToken,
}

pub fn build_router(state: Arc<AppState>) -> Result<Router> {
    let cors = build_cors(&state.config.allow_origins)?;
    Ok(Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state))
}

fn build_cors(origins: &[String]) -> Result<CorsLayer> {
    if origins.iter().any(|o| o == "*") {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(Any));
    }

    let mut headers = Vec::with_capacity(origins.len());
    for origin in origins {
        headers.push(
            HeaderValue::from_str(origin)
                .with_context(|| format!("invalid allowed origin: {origin}"))?,
        );
    }

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(headers))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.relay.registry().len(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    if state.relay.registry().len() >= state.config.max_connections {
        warn!(%peer, max = state.config.max_connections, "relay at capacity, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "relay at capacity").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

/// Drive one WebSocket connection until it closes or is terminated.
///
/// A writer task drains the connection's outbound queue into the socket; this
/// task reads frames and hands them to the relay. Cancelling the connection's
/// token stops both and drops the socket without a close handshake.
///
/// Upgrades that raced past the capacity check in [`ws_handler`] are closed
/// here with 1013 when the registry refuses them.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, peer: SocketAddr) {
    let registry = state.relay.registry().clone();
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.config.queue_capacity);
    let token = state.shutdown.child_token();
    let conn = Arc::new(Connection::new(
        registry.next_id(),
        Some(peer),
        tx,
        token.clone(),
    ));
    let conn_id = conn.id();
    if !registry.register(conn.clone()) {
        warn!(conn_id, %peer, max = state.config.max_connections, "relay at capacity, closing socket");
        let refusal = CloseFrame {
            code: close_code::AGAIN,
            reason: "relay at capacity".into(),
        };
        if let Err(e) = socket.send(Message::Close(Some(refusal))).await {
            debug!(conn_id, error = %e, "close frame not sent");
        }
        return;
    }
    info!(conn_id, %peer, "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_token = token.clone();
    let write_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                _ = writer_token.cancelled() => break,
                frame = rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            let msg = match frame {
                Outbound::Text(text) => Message::Text(text.into()),
                Outbound::Ping => Message::Ping(Bytes::new()),
            };
            if let Err(e) = ws_tx.send(msg).await {
                debug!(conn_id, error = %e, "ws write failed");
                break;
            }
        }
        // A dead writer means the connection is done, whoever noticed first.
        writer_token.cancel();
    });

    loop {
        let msg = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        let Some(msg) = msg else {
            break;
        };
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                debug!(conn_id, error = %e, "ws read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => log_relay_outcome(state.relay.handle_text(&conn, text.as_str())),
            Message::Binary(data) => log_relay_outcome(state.relay.handle_binary(&conn, &data)),
            Message::Pong(_) => {
                registry.mark_alive(conn_id);
            }
            // Answered by the transport.
            Message::Ping(_) => {}
            Message::Close(_) => break,
        }
    }

    token.cancel();
    registry.unregister(conn_id);
    let _ = write_task.await;
    info!(conn_id, %peer, "client disconnected");
}

fn log_relay_outcome(outcome: Result<BroadcastReport, RelayError>) {
    if let Err(e) = outcome {
        warn!("invalid message format: {e}");
    }
}

/// A running relay: HTTP/WebSocket server plus liveness monitor.
pub struct RelayHandle {
    addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    monitor: Option<MonitorHandle>,
    server: Option<JoinHandle<std::io::Result<()>>>,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Stop accepting, cancel the liveness timer and terminate every
    /// connection.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(monitor) = self.monitor.take() {
            monitor.shutdown().await;
        }
        let terminated = self.registry.terminate_all();
        if let Some(server) = self.server.take() {
            server
                .await
                .context("relay server task panicked")?
                .context("relay server failed")?;
        }
        info!(terminated, "relay stopped");
        Ok(())
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Bind `config.listen` and start serving.
pub async fn spawn_relay(config: RelayConfig) -> Result<RelayHandle> {
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.listen))?;
    serve(listener, config).await
}

/// Serve on an already-bound listener.
pub async fn serve(listener: TcpListener, config: RelayConfig) -> Result<RelayHandle> {
    config.validate()?;
    let addr = listener.local_addr()?;

    let registry = Arc::new(Registry::with_capacity(config.max_connections));
    let shutdown = CancellationToken::new();
    let monitor = LivenessMonitor::new(registry.clone(), config.ping_interval()).spawn(shutdown.clone());

    info!(
        %addr,
        ping_interval_ms = config.ping_interval_ms,
        max_connections = config.max_connections,
        delivery = %config.delivery,
        "relay listening"
    );

    let state = Arc::new(AppState {
        relay: Relay::new(registry.clone(), config.delivery, config.max_frame_bytes),
        config,
        shutdown: shutdown.clone(),
    });
    let app = build_router(state)?;

    let server_token = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await
    });

    Ok(RelayHandle {
        addr,
        registry,
        shutdown,
        monitor: Some(monitor),
        server: Some(server),
    })
}
