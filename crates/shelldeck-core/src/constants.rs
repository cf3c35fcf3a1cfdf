//! Protocol and configuration constants for shelldeck.

use std::time::Duration;

// =============================================================================
// Terminal Geometry
// =============================================================================

/// Default terminal columns when the surface cannot report a size.
pub const DEFAULT_COLS: u16 = 80;

/// Default terminal rows when the surface cannot report a size.
pub const DEFAULT_ROWS: u16 = 24;

// =============================================================================
// Transport Constants
// =============================================================================

/// Default shell bridge endpoint.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:3001/ws/ssh";

/// Close status code for a normal, clean closure.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Close status code reported when the transport drops without a close
/// handshake.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

// =============================================================================
// Timing Constants
// =============================================================================

/// Bound on socket establishment plus handshake send.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
