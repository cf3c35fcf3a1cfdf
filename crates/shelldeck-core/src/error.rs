//! Error types for shelldeck-core.

use thiserror::Error;

/// Main error type for shelldeck operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding a wire message failed.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// The terminal surface could not be mounted.
    #[error("mount error: {message}")]
    Mount { message: String },

    /// Transport layer error.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Invalid state transition.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
}

impl Error {
    /// Returns true if this error is transient and a user-initiated retry
    /// may succeed.
    ///
    /// Transient errors are network/transport failures where the remote
    /// bridge may still be reachable on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::ConnectionClosed | Error::Timeout | Error::Io(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Codec {
            message: err.to_string(),
        }
    }
}

/// Convenience result type for shelldeck operations.
pub type Result<T> = std::result::Result<T, Error>;
