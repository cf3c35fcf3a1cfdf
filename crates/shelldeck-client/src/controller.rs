//! Session controller state machine.
//!
//! Orchestrates the terminal surface and the socket: reacts to user
//! intents (connect, reconnect, close view), sequences surface
//! initialization before socket creation, relays traffic while open, and
//! maintains the externally observable connection state.
//!
//! All handling runs inside one `select!` loop, so handlers for a session
//! never execute in parallel and no locking is needed. Each connection
//! attempt carries a monotonically increasing generation number; socket
//! events from superseded generations are discarded, which is the only
//! guard needed against stale callbacks.

use std::fmt;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use shelldeck_core::protocol::{Disconnect, Geometry};
use shelldeck_core::session::{ConnectionState, Credential, SessionDescriptor};
use shelldeck_core::surface::TerminalSurface;

use crate::connection::{self, ConnectionConfig, SocketEvent, SocketHandle};

/// Notice appended to the display whenever the socket ends.
const DISCONNECT_NOTICE: &[u8] = b"\r\n[Disconnected]\r\n";

/// User intents driving the controller.
#[derive(Debug)]
enum Command {
    Connect {
        descriptor: SessionDescriptor,
        credential: Credential,
    },
    Reconnect,
    ViewportChanged,
    CloseView,
    Shutdown,
}

/// User-visible session notifications (the toast analog).
///
/// Each failure is reported once, is non-blocking, and leaves the session
/// view in a retryable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Handshake sent; the session is live.
    Connected {
        /// Display name of the target server.
        server: String,
    },
    /// Clean disconnect; informational, not an error.
    Disconnected {
        /// Display name of the target server.
        server: String,
    },
    /// Abnormal disconnect while the session was live.
    ConnectionLost {
        /// Display name of the affected server.
        server: String,
    },
    /// Socket establishment or handshake failed.
    ConnectionError {
        /// Display name of the target server.
        server: String,
        /// Failure description.
        message: String,
    },
    /// The terminal surface could not be mounted.
    MountFailed {
        /// Failure description.
        message: String,
    },
}

impl Notification {
    /// Whether this notification reports an error condition.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Notification::ConnectionLost { .. }
                | Notification::ConnectionError { .. }
                | Notification::MountFailed { .. }
        )
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Connected { server } => write!(f, "connected to {server}"),
            Notification::Disconnected { server } => write!(f, "disconnected from {server}"),
            Notification::ConnectionLost { server } => write!(f, "connection to {server} lost"),
            Notification::ConnectionError { server, message } => {
                write!(f, "failed to connect to {server}: {message}")
            }
            Notification::MountFailed { message } => {
                write!(f, "terminal unavailable: {message}")
            }
        }
    }
}

/// Cloneable handle for driving a [`SessionController`].
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ControllerHandle {
    /// Open the session view and connect to the given server.
    ///
    /// While a socket is live this switches targets: the old socket is
    /// fully torn down before the new handshake is sent.
    pub fn connect(&self, descriptor: SessionDescriptor, credential: Credential) {
        let _ = self.commands.send(Command::Connect {
            descriptor,
            credential,
        });
    }

    /// Tear down the current socket and dial the same server again.
    ///
    /// The new handshake is not sent until the prior socket's close event
    /// has been observed.
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// The containing viewport changed size; propagate the new geometry if
    /// the session is open and the geometry actually changed.
    pub fn viewport_changed(&self) {
        let _ = self.commands.send(Command::ViewportChanged);
    }

    /// Close the session view: close the socket if open, dispose the
    /// surface, clear the credential, and return to idle.
    pub fn close_view(&self) {
        let _ = self.commands.send(Command::CloseView);
    }

    /// Stop the controller loop after tearing the session down.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Watch the externally observable connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Snapshot of the current connection state.
    pub fn current_state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }
}

/// The session controller.
///
/// Owns exactly one terminal surface and at most one live socket; both are
/// torn down fully before replacements are created. Run it to completion
/// with [`SessionController::run`], typically on a spawned task.
pub struct SessionController<S: TerminalSurface> {
    config: ConnectionConfig,
    surface: S,
    descriptor: Option<SessionDescriptor>,
    credential: Credential,
    /// Generation of the current connection attempt; socket events from
    /// other generations are stale and discarded.
    generation: u64,
    socket: Option<SocketHandle>,
    input: Option<mpsc::UnboundedReceiver<String>>,
    /// Geometry carried by the last handshake or resize frame.
    last_sent_geometry: Option<Geometry>,
    /// A reconnect was requested; dial again once the current socket's
    /// close has been observed.
    pending_reconnect: bool,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<(u64, SocketEvent)>,
    events: mpsc::UnboundedReceiver<(u64, SocketEvent)>,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl<S: TerminalSurface> SessionController<S> {
    /// Create a controller for one session view.
    ///
    /// Returns the controller itself, a handle for issuing user intents,
    /// and the stream of user-visible notifications.
    pub fn new(
        config: ConnectionConfig,
        surface: S,
    ) -> (
        Self,
        ControllerHandle,
        mpsc::UnboundedReceiver<Notification>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let controller = Self {
            config,
            surface,
            descriptor: None,
            credential: Credential::none(),
            generation: 0,
            socket: None,
            input: None,
            last_sent_geometry: None,
            pending_reconnect: false,
            state: state_tx,
            commands: command_rx,
            events_tx: event_tx,
            events: event_rx,
            notifications: notify_tx,
        };

        let handle = ControllerHandle {
            commands: command_tx,
            state: state_rx,
        };

        (controller, handle, notify_rx)
    }

    /// Drive the session until shutdown is requested or every handle is
    /// dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                event = self.events.recv() => {
                    if let Some((generation, event)) = event {
                        self.handle_socket_event(generation, event);
                    }
                }
                unit = next_input(&mut self.input) => match unit {
                    Some(unit) => self.handle_input(unit),
                    // The surface replaced or dropped the stream.
                    None => self.input = None,
                },
            }
        }
        self.teardown();
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                descriptor,
                credential,
            } => {
                debug!(server = %descriptor.id, "connect requested");
                self.descriptor = Some(descriptor);
                self.credential = credential;
                if self.current().is_live() {
                    // Tear the old socket down fully before dialing.
                    self.request_reconnect();
                } else {
                    self.begin_attempt();
                }
            }
            Command::Reconnect => match self.current() {
                ConnectionState::Open => self.request_reconnect(),
                ConnectionState::AwaitingSurface | ConnectionState::Connecting => {
                    trace!("reconnect ignored, attempt already in flight");
                }
                _ => {
                    if self.descriptor.is_some() {
                        self.begin_attempt();
                    } else {
                        warn!("reconnect requested before any connect");
                    }
                }
            },
            Command::ViewportChanged => self.propagate_resize(),
            Command::CloseView => self.close_view(),
            // Shutdown never reaches here; the run loop intercepts it.
            Command::Shutdown => {}
        }
    }

    /// Start a connection attempt: mount the surface, measure it, then
    /// open the socket with the current geometry.
    fn begin_attempt(&mut self) {
        let Some(descriptor) = self.descriptor.clone() else {
            return;
        };

        self.set_state(ConnectionState::AwaitingSurface);
        if let Err(err) = self.surface.mount() {
            warn!(error = %err, "surface mount failed");
            self.notify(Notification::MountFailed {
                message: err.to_string(),
            });
            self.set_state(ConnectionState::Idle);
            return;
        }

        let geometry = self.surface.fit();
        self.input = Some(self.surface.subscribe_input());
        self.generation += 1;

        match connection::open(
            &self.config,
            &descriptor,
            geometry,
            &self.credential,
            self.generation,
            self.events_tx.clone(),
        ) {
            Ok(handle) => {
                self.socket = Some(handle);
                self.last_sent_geometry = Some(geometry);
                self.set_state(ConnectionState::Connecting);
            }
            Err(err) => {
                warn!(error = %err, "failed to start connection attempt");
                self.notify(Notification::ConnectionError {
                    server: descriptor.name.clone(),
                    message: err.to_string(),
                });
                self.set_state(ConnectionState::Failed {
                    reason: err.to_string(),
                });
            }
        }
    }

    /// Ask the current socket to close; a new attempt starts once its
    /// close event is observed. Never a timer.
    fn request_reconnect(&mut self) {
        self.pending_reconnect = true;
        if let Some(socket) = &self.socket {
            debug!(generation = socket.generation(), "closing socket before reconnect");
            socket.close();
        }
    }

    fn handle_socket_event(&mut self, generation: u64, event: SocketEvent) {
        if generation != self.generation {
            trace!(
                generation,
                current = self.generation,
                "discarding event from superseded socket"
            );
            return;
        }

        match event {
            SocketEvent::Opened => {
                info!(server = %self.server_name(), "session connected");
                self.set_state(ConnectionState::Open);
                self.notify(Notification::Connected {
                    server: self.server_name(),
                });
            }
            SocketEvent::Frame(data) => self.surface.write(&data),
            SocketEvent::ConnectFailed(err) => {
                self.socket = None;
                if self.pending_reconnect {
                    // The aborted attempt was superseded on purpose.
                    self.pending_reconnect = false;
                    self.begin_attempt();
                    return;
                }
                warn!(error = %err, "connection attempt failed");
                self.notify(Notification::ConnectionError {
                    server: self.server_name(),
                    message: err.to_string(),
                });
                self.set_state(ConnectionState::Failed {
                    reason: err.to_string(),
                });
            }
            SocketEvent::Closed(disconnect) => {
                self.socket = None;
                self.surface.write(DISCONNECT_NOTICE);
                match &disconnect {
                    Disconnect::Clean { reason } => {
                        info!(server = %self.server_name(), "session disconnected");
                        self.set_state(ConnectionState::Closed {
                            code: disconnect.code(),
                            reason: reason.clone(),
                        });
                        self.notify(Notification::Disconnected {
                            server: self.server_name(),
                        });
                    }
                    Disconnect::Abnormal { code, reason } => {
                        warn!(
                            server = %self.server_name(),
                            code,
                            reason = reason.as_str(),
                            "connection lost"
                        );
                        self.set_state(ConnectionState::Failed {
                            reason: format!("connection lost (code {code})"),
                        });
                        self.notify(Notification::ConnectionLost {
                            server: self.server_name(),
                        });
                    }
                }
                if self.pending_reconnect {
                    self.pending_reconnect = false;
                    self.begin_attempt();
                }
            }
        }
    }

    /// Relay one unit of user input. Input outside the open state is
    /// dropped, never queued.
    fn handle_input(&mut self, unit: String) {
        if !self.current().is_open() {
            trace!("dropping input outside open state");
            return;
        }
        if let Some(socket) = &self.socket {
            socket.send_input(unit);
        }
    }

    /// Re-measure the surface and send a resize frame if the geometry
    /// changed since the last one sent. Redundant layout passes produce no
    /// frames.
    fn propagate_resize(&mut self) {
        if !self.current().is_open() {
            trace!("viewport change outside open state ignored");
            return;
        }
        let geometry = self.surface.fit();
        if self.last_sent_geometry == Some(geometry) {
            trace!(geometry = %geometry, "geometry unchanged, resize suppressed");
            return;
        }
        if let Some(socket) = &self.socket {
            debug!(geometry = %geometry, "propagating resize");
            socket.send_resize(geometry);
            self.last_sent_geometry = Some(geometry);
        }
    }

    /// Cancel the logical session immediately, even if the transport close
    /// has not completed yet. Bumping the generation makes any late events
    /// from the current socket stale.
    fn close_view(&mut self) {
        debug!("closing session view");
        self.generation += 1;
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        self.surface.dispose();
        self.input = None;
        self.credential.clear();
        self.pending_reconnect = false;
        self.last_sent_geometry = None;
        self.set_state(ConnectionState::Idle);
    }

    fn teardown(&mut self) {
        if self.socket.is_some() || !matches!(self.current(), ConnectionState::Idle) {
            self.close_view();
        }
    }

    fn current(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(from = %self.state.borrow().label(), to = %state.label(), "state transition");
        let _ = self.state.send(state);
    }

    fn notify(&self, notification: Notification) {
        let _ = self.notifications.send(notification);
    }

    fn server_name(&self) -> String {
        self.descriptor
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_default()
    }
}

/// Await the next input unit, or park forever when no stream is
/// subscribed.
async fn next_input(input: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match input {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
