//! Outgoing messages.
//!
//! The input loop never touches the socket. It stamps each line into a
//! [`Frame`] and pushes it onto a bounded queue with `try_send`; a dedicated
//! sender task drains the queue into the persistent connection.
//!
//! Delivery is fire-and-forget: a full queue, a closed queue, or a failed
//! socket write drops the message. Nothing is retried and nothing is shown
//! to the operator.

use std::fmt::Display;

use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::input::Dispatch;
use crate::protocol::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    Queued,
    Dropped,
}

#[derive(Clone)]
pub struct Outbox {
    username: String,
    tx: mpsc::Sender<Frame>,
}

impl Outbox {
    pub fn new(username: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let outbox = Self {
            username: username.into(),
            tx,
        };
        (outbox, rx)
    }

    /// Stamp `text` with the current time and queue it without blocking.
    pub fn submit(&self, text: impl Into<String>) -> Submit {
        let frame = Frame::new(self.username.as_str(), text);
        match self.tx.try_send(frame) {
            Ok(()) => Submit::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("outgoing queue full, dropping message");
                Submit::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("sender stopped, dropping message");
                Submit::Dropped
            }
        }
    }
}

impl Dispatch for Outbox {
    fn dispatch(&self, line: String) {
        self.submit(line);
    }
}

/// Write queued frames to `sink` until the queue closes or `stop` fires.
///
/// After the first failed write the connection is considered gone and the
/// remaining frames are discarded. Returns how many frames were written.
pub async fn drain<S>(mut rx: mpsc::Receiver<Frame>, mut sink: S, stop: CancellationToken) -> usize
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut sent = 0;
    let mut connected = true;

    loop {
        let frame = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if !connected {
            tracing::debug!("connection closed, discarding outgoing message");
            continue;
        }

        let encoded = match frame.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outgoing message");
                continue;
            }
        };

        match sink.send(Message::text(encoded.to_string())).await {
            Ok(()) => sent += 1,
            Err(e) => {
                tracing::warn!(error = %e, "send failed, message lost");
                connected = false;
            }
        }
    }

    if connected {
        let _ = sink.close().await;
    }
    sent
}
