#![allow(dead_code)]

use chatline::protocol::Frame;
use chatline::server::{self, AppState};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsTx = SplitSink<Ws, Message>;
pub type WsRx = SplitStream<Ws>;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A server bound to an ephemeral localhost port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = AppState::new();
        let listener = server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serve_state = state.clone();
        let task = tokio::spawn(async move {
            server::serve(listener, serve_state, async {
                stop_rx.await.ok();
            })
            .await
            .unwrap();
        });
        Self {
            addr,
            state,
            stop: Some(stop_tx),
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Trigger graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), &mut self.task)
            .await
            .expect("server should shut down")
            .unwrap();
    }
}

pub async fn connect(addr: SocketAddr) -> (WsTx, WsRx) {
    let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    ws.split()
}

/// Connect and wait until the server has registered the new peer.
pub async fn connect_registered(server: &TestServer) -> (WsTx, WsRx) {
    let before = server.state.hub.peer_count();
    let conn = connect(server.addr).await;
    wait_until(|| server.state.hub.peer_count() > before).await;
    conn
}

pub async fn send(tx: &mut WsTx, username: &str, text: &str) {
    let frame = Frame::new(username, text);
    tx.send(Message::text(frame.encode().unwrap().to_string()))
        .await
        .unwrap();
}

pub async fn send_raw(tx: &mut WsTx, payload: &str) {
    tx.send(Message::text(payload.to_string())).await.unwrap();
}

/// Receive the next chat frame, failing the test on timeout.
pub async fn recv_frame(rx: &mut WsRx) -> Frame {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, rx.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        match msg {
            Message::Text(text) => return Frame::decode(text.as_str()).expect("invalid frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got {:?}", other),
        }
    }
}

/// Receive up to one frame within `timeout`.
pub async fn try_recv_frame(rx: &mut WsRx, timeout: Duration) -> Option<Frame> {
    match tokio::time::timeout(timeout, rx.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => Frame::decode(text.as_str()).ok(),
        _ => None,
    }
}

pub async fn recv_messages(rx: &mut WsRx, n: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(recv_frame(rx).await.message().to_string());
    }
    out
}

/// Poll `cond` until it holds, failing after five seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
