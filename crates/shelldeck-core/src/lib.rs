//! shelldeck-core: Shared library for the shelldeck terminal session core.
//!
//! This crate provides:
//! - Wire message definitions for the shell bridge protocol
//! - Session descriptor, credential, and connection state types
//! - The terminal surface contract
//! - Close/error classification
//! - Logging setup

pub mod constants;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod surface;

pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat};
