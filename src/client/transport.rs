//! The client's persistent connection.
//!
//! One WebSocket is opened per client run. Its read half feeds the shared
//! buffer; its write half is owned by the outbox sender. When the server
//! goes away the receive loop ends and the client keeps running without a
//! connection. There is no reconnect.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::buffer::SharedBuffer;
use super::outbox;
use crate::protocol::Frame;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on connection establishment.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Status line shown when the server connection ends.
pub const DISCONNECTED_LINE: &str = "*** disconnected from server ***";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportExit {
    /// The client was stopped locally.
    Stopped,
    /// The server closed the connection or it failed.
    Closed,
    /// The connection could not be established.
    ConnectFailed,
}

pub async fn connect(url: &str) -> Result<WsStream, tungstenite::Error> {
    let connecting = tokio_tungstenite::connect_async(url);
    match tokio::time::timeout(CONNECT_TIMEOUT, connecting).await {
        Ok(result) => result.map(|(ws, _response)| ws),
        Err(_) => Err(tungstenite::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("timed out connecting to {url}"),
        ))),
    }
}

/// Append every decodable inbound frame to `buffer` until the stream ends
/// or `stop` fires. Undecodable frames are skipped.
pub async fn receive_loop<S>(mut stream: S, buffer: SharedBuffer, stop: CancellationToken) -> TransportExit
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::select! {
            biased;
            _ = stop.cancelled() => return TransportExit::Stopped,
            msg = stream.next() => msg,
        };

        let decoded = match msg {
            Some(Ok(Message::Text(text))) => Frame::decode(text.as_str()),
            Some(Ok(Message::Binary(data))) => Frame::decode_bytes(&data),
            Some(Ok(Message::Close(_))) | None => return TransportExit::Closed,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "receive error");
                return TransportExit::Closed;
            }
        };

        match decoded {
            Ok(frame) => buffer.append(frame.display_line()),
            Err(e) => tracing::debug!(error = %e, "skipping undecodable frame"),
        }
    }
}

/// Connect to `url`, then receive into `buffer` and send from `outgoing`
/// until the server closes the connection or `stop` fires.
///
/// Returns once both halves are done. The sender half keeps discarding
/// outgoing frames after a disconnect until the client stops.
pub async fn run(
    url: String,
    buffer: SharedBuffer,
    outgoing: mpsc::Receiver<Frame>,
    stop: CancellationToken,
) -> TransportExit {
    let ws = tokio::select! {
        biased;
        _ = stop.cancelled() => return TransportExit::Stopped,
        result = connect(&url) => match result {
            Ok(ws) => ws,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "connection failed");
                buffer.append(format!("*** could not connect to {url} ***"));
                return TransportExit::ConnectFailed;
            }
        },
    };
    tracing::info!(url = %url, "connected");

    let (sink, stream) = ws.split();
    let sender = tokio::spawn(outbox::drain(outgoing, sink, stop.clone()));

    let exit = receive_loop(stream, buffer.clone(), stop.clone()).await;
    if exit == TransportExit::Closed {
        tracing::info!(url = %url, "server closed the connection");
        buffer.append(DISCONNECTED_LINE);
    }

    match sender.await {
        Ok(sent) => tracing::debug!(sent, "sender finished"),
        Err(e) => tracing::warn!(error = %e, "sender task failed"),
    }
    exit
}
