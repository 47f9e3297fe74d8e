//! Server-side state and loop for one WebSocket connection.
//!
//! Lifecycle: `Connected → Replaying → Live → Closed`. A session replays the
//! full history, registers for live broadcasts, then relays inbound frames
//! to the hub and queued outbound frames to the socket until the connection
//! ends. Malformed payloads are dropped without closing the connection.

use std::net::SocketAddr;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::hub::{BroadcastReport, Hub};
use crate::protocol::{EncodedFrame, Frame, ProtocolError};
use crate::registry::{DeliveryError, Peer, PeerId};
use crate::shutdown::ShutdownCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Replaying,
    Live,
    Closed,
}

/// What happened to one inbound payload.
#[derive(Debug)]
pub enum Inbound {
    /// Appended to history and fanned out.
    Accepted(BroadcastReport),
    /// Rejected; history and registry are untouched.
    Dropped(ProtocolError),
}

pub struct Session {
    peer: Peer,
    hub: Hub,
    state: SessionState,
}

impl Session {
    /// Create a session for a freshly accepted connection, returning the
    /// receiving end of its outbound queue.
    pub fn new(hub: Hub, addr: Option<SocketAddr>) -> (Self, mpsc::UnboundedReceiver<EncodedFrame>) {
        let (peer, outbound) = Peer::channel(addr);
        let session = Self {
            peer,
            hub,
            state: SessionState::Connected,
        };
        (session, outbound)
    }

    pub fn id(&self) -> PeerId {
        self.peer.id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Queue the history replay and register for live broadcasts.
    pub fn join(&mut self) -> Result<usize, DeliveryError> {
        self.state = SessionState::Replaying;
        match self.hub.join(self.peer.clone()) {
            Ok(replayed) => {
                self.state = SessionState::Live;
                Ok(replayed)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    pub fn handle_text(&self, text: &str) -> Inbound {
        self.accept(Frame::decode(text))
    }

    pub fn handle_binary(&self, data: &[u8]) -> Inbound {
        self.accept(Frame::decode_bytes(data))
    }

    fn accept(&self, decoded: Result<Frame, ProtocolError>) -> Inbound {
        let result = decoded.and_then(|frame| self.hub.broadcast(&frame));
        match result {
            Ok(report) => {
                tracing::debug!(
                    peer = %self.id(),
                    seq = report.seq,
                    delivered = report.delivered,
                    "frame broadcast"
                );
                Inbound::Accepted(report)
            }
            Err(e) => {
                tracing::debug!(peer = %self.id(), error = %e, "dropping malformed frame");
                Inbound::Dropped(e)
            }
        }
    }

    /// Unregister and mark closed. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.hub.remove(self.id());
        self.state = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drive one WebSocket connection until it closes, errors, or the server
/// shuts down.
pub async fn run(
    socket: WebSocket,
    hub: Hub,
    shutdown: ShutdownCoordinator,
    addr: Option<SocketAddr>,
) {
    let (_guard, mut shutdown_rx) = shutdown.register();
    let (mut session, mut outbound) = Session::new(hub, addr);
    let peer = session.id();
    tracing::info!(peer = %peer, addr = ?addr, "connection accepted");

    let (mut ws_tx, mut ws_rx) = socket.split();

    match session.join() {
        Ok(replayed) => tracing::debug!(peer = %peer, replayed, "history replay queued"),
        Err(e) => {
            tracing::debug!(peer = %peer, error = %e, "join failed");
            return;
        }
    }

    loop {
        tokio::select! {
            // Hub -> WebSocket
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                    tracing::debug!(peer = %peer, "send failed, closing");
                    break;
                }
            }

            // WebSocket -> hub
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        session.handle_text(text.as_str());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        session.handle_binary(&data);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ping/Pong handled by axum
                    Some(Err(e)) => {
                        tracing::debug!(peer = %peer, error = %e, "receive error");
                        break;
                    }
                }
            }

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::debug!(peer = %peer, "shutdown signal, closing");
                    let close_frame = CloseFrame {
                        code: close_code::NORMAL,
                        reason: "server shutting down".into(),
                    };
                    let _ = ws_tx.send(Message::Close(Some(close_frame))).await;
                    let _ = ws_tx.flush().await;
                    break;
                }
            }
        }
    }

    session.close();
    tracing::info!(peer = %peer, "connection closed");
}
