//! shelldeck-client: interactive terminal session controller.
//!
//! Turns a user's "Connect" intent into a live, bidirectional, resizable
//! terminal session over a single duplex WebSocket to a remote shell
//! bridge, and manages the full connection lifecycle:
//!
//! 1. Mount the terminal surface and measure its geometry
//! 2. Open the socket and send the handshake
//! 3. Steady-state relay between surface and socket
//! 4. Classified teardown (clean close, abnormal close, user cancel)
//!
//! The rendering engine behind the surface and the SSH bridge on the far
//! side of the socket are external collaborators; this crate only drives
//! them.

pub mod cli;
pub mod connection;
pub mod controller;
pub mod terminal;

pub use cli::Cli;
pub use connection::{ConnectionConfig, SocketEvent, SocketHandle};
pub use controller::{ControllerHandle, Notification, SessionController};
pub use shelldeck_core::surface::TerminalSurface;
pub use terminal::StdioSurface;
