//! Socket connection management.
//!
//! One `open` call creates one duplex socket and one relay task. The relay
//! performs the handshake (always the first outbound frame), then moves
//! frames between the socket and the controller until the socket ends, at
//! which point the close is classified as clean or abnormal.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, trace, warn};

use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use shelldeck_core::constants::{ABNORMAL_CLOSE_CODE, CONNECT_TIMEOUT, DEFAULT_ENDPOINT};
use shelldeck_core::protocol::{ControlFrame, Disconnect, Geometry, Handshake};
use shelldeck_core::session::{Credential, SessionDescriptor};
use shelldeck_core::{Error, Result};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Shell bridge endpoint URL. Opaque to this core.
    pub endpoint_url: String,
    /// Bound on socket establishment plus handshake send.
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Events a socket reports back to its controller.
///
/// Every event is tagged with the generation of the socket that produced
/// it, so the controller can discard events from superseded sockets.
#[derive(Debug)]
pub enum SocketEvent {
    /// Transport established and handshake sent.
    Opened,
    /// One inbound frame, text or binary, verbatim.
    Frame(Bytes),
    /// Establishment or handshake failed; no `Closed` event follows.
    ConnectFailed(Error),
    /// The socket ended, classified.
    Closed(Disconnect),
}

/// Outbound traffic from the controller to the relay task.
#[derive(Debug)]
enum Outbound {
    /// One unit of user input, sent as one text frame.
    Input(String),
    /// A pre-serialized control frame.
    Resize(String),
    /// Request an orderly shutdown.
    Close,
}

/// Handle to one live socket.
///
/// Dropping the handle (without calling [`SocketHandle::close`]) also
/// shuts the socket down; sends on a finished socket are silent no-ops,
/// never queued.
#[derive(Debug)]
pub struct SocketHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SocketHandle {
    /// Generation of the connection attempt that created this socket.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forward one unit of user input as one outbound frame.
    pub fn send_input(&self, unit: String) {
        let _ = self.outbound.send(Outbound::Input(unit));
    }

    /// Send a resize notification. No-op once the socket is gone.
    pub fn send_resize(&self, geometry: Geometry) {
        match ControlFrame::resize(geometry).to_json() {
            Ok(json) => {
                let _ = self.outbound.send(Outbound::Resize(json));
            }
            Err(err) => warn!(error = %err, "failed to encode resize frame"),
        }
    }

    /// Request an orderly shutdown with the normal close code.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Open one socket to the bridge and start its relay task.
///
/// The handshake is built from the descriptor's id, the given geometry,
/// and the credential (omitted entirely when no password was supplied),
/// and is guaranteed to be the first outbound frame on the socket.
pub fn open(
    config: &ConnectionConfig,
    descriptor: &SessionDescriptor,
    geometry: Geometry,
    credential: &Credential,
    generation: u64,
    events: mpsc::UnboundedSender<(u64, SocketEvent)>,
) -> Result<SocketHandle> {
    let handshake = Handshake::for_session(descriptor, geometry, credential).to_json()?;
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    debug!(
        server = %descriptor.id,
        generation,
        geometry = %geometry,
        auth = credential.has_password(),
        "opening socket"
    );

    tokio::spawn(run_socket(
        config.endpoint_url.clone(),
        handshake,
        config.connect_timeout,
        generation,
        outbound_rx,
        events,
    ));

    Ok(SocketHandle {
        generation,
        outbound: outbound_tx,
    })
}

/// Relay task for one socket: establish, handshake, then shuttle frames
/// until the stream ends.
async fn run_socket(
    url: String,
    handshake: String,
    connect_timeout: Duration,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<(u64, SocketEvent)>,
) {
    let attempt = async {
        let (mut ws, _response) = connect_async(url.as_str()).await.map_err(|e| Error::Transport {
            message: e.to_string(),
        })?;
        // The handshake precedes any other outbound frame; the relay loop
        // below only starts consuming the outbound queue afterwards.
        ws.send(Message::Text(handshake))
            .await
            .map_err(|e| Error::Transport {
                message: e.to_string(),
            })?;
        Ok::<_, Error>(ws)
    };

    let mut ws = match time::timeout(connect_timeout, attempt).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(err)) => {
            debug!(generation, error = %err, "socket establishment failed");
            let _ = events.send((generation, SocketEvent::ConnectFailed(err)));
            return;
        }
        Err(_) => {
            debug!(generation, "socket establishment timed out");
            let _ = events.send((generation, SocketEvent::ConnectFailed(Error::Timeout)));
            return;
        }
    };

    debug!(generation, "socket established, handshake sent");
    let _ = events.send((generation, SocketEvent::Opened));

    // Close frame received from the peer, if any; drives classification.
    let mut close_frame: Option<CloseFrame<'static>> = None;
    let mut local_close = false;
    let mut closing = false;
    let mut outbound_open = true;

    loop {
        tokio::select! {
            cmd = outbound.recv(), if outbound_open => {
                let cmd = match cmd {
                    Some(cmd) => cmd,
                    None => {
                        // Controller dropped the handle: treat as close.
                        outbound_open = false;
                        Outbound::Close
                    }
                };
                match cmd {
                    Outbound::Input(unit) => {
                        if closing {
                            trace!(generation, "dropping input after close request");
                        } else if let Err(err) = ws.send(Message::Text(unit)).await {
                            // The read side will observe and classify the failure.
                            trace!(generation, error = %err, "input send failed");
                        }
                    }
                    Outbound::Resize(json) => {
                        if !closing {
                            let _ = ws.send(Message::Text(json)).await;
                        }
                    }
                    Outbound::Close => {
                        if !closing {
                            closing = true;
                            local_close = true;
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "session closed by client".into(),
                            };
                            let _ = ws.send(Message::Close(Some(frame))).await;
                        }
                    }
                }
            }
            inbound = ws.next() => match inbound {
                Some(Ok(Message::Binary(data))) => {
                    let _ = events.send((generation, SocketEvent::Frame(Bytes::from(data))));
                }
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send((generation, SocketEvent::Frame(Bytes::from(text.into_bytes()))));
                }
                Some(Ok(Message::Close(frame))) => {
                    close_frame = frame;
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by the protocol layer.
                }
                Some(Err(err)) => {
                    let disconnect = classify_error(err, close_frame.take(), local_close);
                    debug!(generation, code = disconnect.code(), "socket ended");
                    let _ = events.send((generation, SocketEvent::Closed(disconnect)));
                    return;
                }
                None => {
                    let disconnect = classify_close(close_frame.take(), local_close);
                    debug!(generation, code = disconnect.code(), "socket closed");
                    let _ = events.send((generation, SocketEvent::Closed(disconnect)));
                    return;
                }
            },
        }
    }
}

/// Classify the end of a socket from the close frame, if any.
fn classify_close(frame: Option<CloseFrame<'static>>, local_close: bool) -> Disconnect {
    match frame {
        Some(frame) => Disconnect::from_close_code(u16::from(frame.code), frame.reason.to_string()),
        None if local_close => Disconnect::Clean {
            reason: "closed by client".into(),
        },
        None => Disconnect::dropped(),
    }
}

/// Classify a read error. Orderly-shutdown errors defer to the close
/// frame; anything else is an abnormal disconnect.
fn classify_error(
    err: WsError,
    frame: Option<CloseFrame<'static>>,
    local_close: bool,
) -> Disconnect {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => classify_close(frame, local_close),
        other => Disconnect::Abnormal {
            code: ABNORMAL_CLOSE_CODE,
            reason: other.to_string(),
        },
    }
}
