//! HTTP/WebSocket front end for the broadcast hub.
//!
//! Every path upgrades to a chat WebSocket except `/health`, which reports
//! peer and history counts as JSON.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::hub::Hub;
use crate::protocol::MAX_FRAME_BYTES;
use crate::session;
use crate::shutdown::ShutdownCoordinator;

/// WebSocket message limit. Kept above [`MAX_FRAME_BYTES`] so an oversized
/// chat frame reaches the session and is dropped there, leaving the
/// connection open. Only messages past this limit reset the connection.
pub const MAX_WS_MESSAGE_BYTES: usize = MAX_FRAME_BYTES * 4;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Clone, Default)]
pub struct AppState {
    pub hub: Hub,
    pub shutdown: ShutdownCoordinator,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(ws_chat))
        .fallback(ws_chat)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "peers": state.hub.peer_count(),
        "history": state.hub.history_len(),
    }))
}

async fn ws_chat(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_WS_MESSAGE_BYTES)
        .on_upgrade(move |socket| session::run(socket, state.hub, state.shutdown, Some(addr)))
}

/// Bind the listening socket. Failure here is fatal to the process.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serve the router on `listener` until `signal` resolves.
///
/// When the signal fires, live sessions are told to send close frames and
/// given a short grace period before the listener stops.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let graceful = async move {
        signal.await;
        shutdown.shutdown();
        if !shutdown.wait_for_all_closed(Duration::from_millis(500)).await {
            tracing::debug!(
                remaining = shutdown.active_count(),
                "connections still open after grace period"
            );
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful)
    .await
    .map_err(ServerError::Serve)
}
