//! Wire protocol for the shell bridge.
//!
//! The protocol is deliberately thin: one JSON handshake binds a freshly
//! opened socket to a logical remote session, JSON control frames carry
//! geometry changes, and everything else on the socket is a raw byte pipe
//! -- untagged text frames for keystrokes going out, untagged text or
//! binary frames for display data coming in.

mod control;
mod geometry;
mod handshake;
mod lifecycle;

#[cfg(test)]
mod proptest;

pub use control::ControlFrame;
pub use geometry::Geometry;
pub use handshake::{Auth, Handshake};
pub use lifecycle::Disconnect;
