//! Connection state for a logical terminal session.

use std::fmt;

/// Externally observable state of one terminal session.
///
/// Exactly one instance exists per session, owned by the session
/// controller; every other component observes it through a watch channel
/// and none mutates it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session view is active.
    Idle,
    /// The terminal surface is being mounted ahead of a connection attempt.
    AwaitingSurface,
    /// Socket establishment and handshake are in flight.
    Connecting,
    /// Handshake sent; the session is relaying traffic.
    Open,
    /// The socket closed cleanly.
    Closed {
        /// Close status code reported by the transport.
        code: u16,
        /// Reason text from the close frame, possibly empty.
        reason: String,
    },
    /// The attempt or the open session failed.
    Failed {
        /// Human-readable failure description.
        reason: String,
    },
}

impl ConnectionState {
    /// Whether the session is relaying traffic.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Whether a socket is live or being established.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionState::AwaitingSurface | ConnectionState::Connecting | ConnectionState::Open
        )
    }

    /// Whether a fresh connection attempt may start from this state.
    pub fn can_connect(&self) -> bool {
        matches!(
            self,
            ConnectionState::Idle | ConnectionState::Closed { .. } | ConnectionState::Failed { .. }
        )
    }

    /// Short label for logs and status lines.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::AwaitingSurface => "awaiting-surface",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed { .. } => "closed",
            ConnectionState::Failed { .. } => "failed",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Idle
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
