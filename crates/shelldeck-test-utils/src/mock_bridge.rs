//! Scripted WebSocket server standing in for the SSH-to-socket bridge.
//!
//! Each accepted socket reads its first text frame as the handshake, then
//! follows actions scripted by the test: send display frames, close with a
//! chosen status code, stall without reading (to delay the close
//! handshake), or sever the TCP connection outright.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::trace;

/// One frame received from the client after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeFrame {
    /// Text frame (raw input or a tagged control frame).
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

#[derive(Debug)]
enum Action {
    SendText(String),
    SendBinary(Vec<u8>),
    Close { code: u16, reason: String },
    Stall(Duration),
    Sever,
}

/// Scripted bridge server bound to an ephemeral localhost port.
pub struct MockBridge {
    url: String,
    connections: mpsc::UnboundedReceiver<BridgeConnection>,
}

impl MockBridge {
    /// Bind and start accepting connections.
    ///
    /// # Panics
    ///
    /// Panics when no ephemeral port can be bound; test-only code.
    pub async fn start() -> Self {
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(e) => panic!("failed to bind mock bridge: {e}"),
        };
        let url = match listener.local_addr() {
            Ok(addr) => format!("ws://{addr}"),
            Err(e) => panic!("failed to read mock bridge address: {e}"),
        };
        let (conn_tx, connections) = mpsc::unbounded_channel();
        tokio::spawn(accept_loop(listener, conn_tx));
        Self { url, connections }
    }

    /// Endpoint URL for connecting clients.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Await the next accepted connection, panicking after five seconds.
    pub async fn next_connection(&mut self) -> BridgeConnection {
        match tokio::time::timeout(Duration::from_secs(5), self.connections.recv()).await {
            Ok(Some(conn)) => conn,
            Ok(None) => panic!("mock bridge stopped"),
            Err(_) => panic!("timed out waiting for a connection"),
        }
    }

    /// Await a connection for at most `wait`; `None` when nothing dialed
    /// in.
    pub async fn try_next_connection(&mut self, wait: Duration) -> Option<BridgeConnection> {
        tokio::time::timeout(wait, self.connections.recv())
            .await
            .ok()
            .flatten()
    }
}

/// One accepted socket, already past its handshake frame.
///
/// Dropping the connection handle severs the link.
pub struct BridgeConnection {
    /// The first text frame the client sent on this socket.
    pub handshake: String,
    frames: mpsc::UnboundedReceiver<BridgeFrame>,
    actions: mpsc::UnboundedSender<Action>,
}

impl BridgeConnection {
    /// Parse the handshake frame as JSON.
    ///
    /// # Panics
    ///
    /// Panics when the handshake is not valid JSON; test-only code.
    pub fn handshake_json(&self) -> serde_json::Value {
        match serde_json::from_str(&self.handshake) {
            Ok(value) => value,
            Err(e) => panic!("handshake is not valid JSON: {e}"),
        }
    }

    /// Await the next post-handshake frame, panicking after five seconds.
    pub async fn next_frame(&mut self) -> BridgeFrame {
        match tokio::time::timeout(Duration::from_secs(5), self.frames.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => panic!("bridge connection ended"),
            Err(_) => panic!("timed out waiting for a frame"),
        }
    }

    /// Await a frame for at most `wait`; `None` when the client stayed
    /// quiet.
    pub async fn try_next_frame(&mut self, wait: Duration) -> Option<BridgeFrame> {
        tokio::time::timeout(wait, self.frames.recv())
            .await
            .ok()
            .flatten()
    }

    /// Send a text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.actions.send(Action::SendText(text.into()));
    }

    /// Send a binary frame to the client.
    pub fn send_binary(&self, data: Vec<u8>) {
        let _ = self.actions.send(Action::SendBinary(data));
    }

    /// Close the socket with the given status code and reason.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.actions.send(Action::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Stop servicing the socket for `pause`. Frames the client sends in
    /// the meantime (including its close frame) sit unanswered, which lets
    /// tests delay the close handshake.
    pub fn stall(&self, pause: Duration) {
        let _ = self.actions.send(Action::Stall(pause));
    }

    /// Drop the TCP connection without a close handshake.
    pub fn sever(&self) {
        let _ = self.actions.send(Action::Sever);
    }
}

async fn accept_loop(listener: TcpListener, conn_tx: mpsc::UnboundedSender<BridgeConnection>) {
    loop {
        let Ok((stream, peer)) = listener.accept().await else {
            return;
        };
        trace!(%peer, "bridge accepted connection");
        let conn_tx = conn_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, conn_tx).await {
                trace!(error = e, "bridge connection ended");
            }
        });
    }
}

async fn serve_connection(
    stream: TcpStream,
    conn_tx: mpsc::UnboundedSender<BridgeConnection>,
) -> std::result::Result<(), &'static str> {
    let mut ws = accept_async(stream)
        .await
        .map_err(|_| "websocket accept failed")?;

    // First frame on every socket is the handshake.
    let handshake = match ws.next().await {
        Some(Ok(Message::Text(text))) => text,
        _ => return Err("expected a text handshake frame"),
    };

    let (action_tx, mut actions) = mpsc::unbounded_channel();
    let (frame_tx, frames) = mpsc::unbounded_channel();
    conn_tx
        .send(BridgeConnection {
            handshake,
            frames,
            actions: action_tx,
        })
        .map_err(|_| "bridge stopped")?;

    loop {
        tokio::select! {
            action = actions.recv() => match action {
                Some(Action::SendText(text)) => {
                    let _ = ws.send(Message::Text(text)).await;
                }
                Some(Action::SendBinary(data)) => {
                    let _ = ws.send(Message::Binary(data)).await;
                }
                Some(Action::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = ws.send(Message::Close(Some(frame))).await;
                }
                Some(Action::Stall(pause)) => {
                    // Deliberately not polling the socket here.
                    tokio::time::sleep(pause).await;
                }
                Some(Action::Sever) | None => return Ok(()),
            },
            inbound = ws.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let _ = frame_tx.send(BridgeFrame::Text(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    let _ = frame_tx.send(BridgeFrame::Binary(data));
                }
                Some(Ok(_)) => {
                    // Close frames are acknowledged by the protocol layer.
                }
                Some(Err(_)) | None => return Ok(()),
            },
        }
    }
}
