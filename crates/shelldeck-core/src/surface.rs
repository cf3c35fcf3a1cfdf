//! Terminal surface contract.

use tokio::sync::mpsc;

use crate::protocol::Geometry;
use crate::Result;

/// Contract between the session controller and a terminal-rendering
/// surface.
///
/// Isolating the rendering engine behind this trait lets the connection
/// manager and session controller be written, and tested, without a real
/// rendering surface: a fake that records writes and synthesizes input is
/// sufficient for protocol-level tests.
///
/// Implementations own their display region; mounting binds rendering
/// resources to it.
pub trait TerminalSurface: Send + 'static {
    /// Attach the rendering engine, replacing any previously mounted
    /// instance for this controller (idempotent re-mount).
    ///
    /// Failure means no display region is available and is fatal to the
    /// pending connection attempt.
    fn mount(&mut self) -> Result<()>;

    /// Feed data to the display, preserving byte order.
    ///
    /// Rendering failures are swallowed at this layer; the caller sees no
    /// failure mode.
    fn write(&mut self, data: &[u8]);

    /// Subscribe to the keystroke stream: one `String` unit per input
    /// generation event, delivered in generation order.
    ///
    /// Each call replaces the previous subscriber, so exactly one is
    /// active at a time; a new connection attempt re-subscribes.
    fn subscribe_input(&mut self) -> mpsc::UnboundedReceiver<String>;

    /// Recompute the display's column/row capacity from the current
    /// viewport.
    ///
    /// Pure layout operation: safe before any socket exists and after a
    /// window resize.
    fn fit(&mut self) -> Geometry;

    /// Release rendering resources. Safe to call repeatedly, and on a
    /// surface that was never mounted.
    fn dispose(&mut self);
}
