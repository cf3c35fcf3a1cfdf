//! Session descriptor and credential types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable record identifying the remote endpoint a connection attempt
/// targets.
///
/// Created by the inventory subsystem; this core never mutates or persists
/// it. Switching target servers replaces the descriptor wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Inventory identifier, carried in the handshake as `serverId`.
    pub id: String,
    /// Human-readable name, used in user-facing notifications.
    pub name: String,
    /// Remote host the bridge dials on our behalf.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Login user on the remote host.
    pub username: String,
}

impl SessionDescriptor {
    /// The `host:port` endpoint label for logs and status lines.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Transient credential captured from the connect dialog.
///
/// Exists only to construct a handshake message; cleared when the session
/// view closes. An empty password field means "no password supplied" -- the
/// bridge must be able to distinguish an absent `auth` object from an empty
/// one, so blank input never produces a credential.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    password: Option<String>,
}

impl Credential {
    /// Build a credential from optional dialog input. Blank input is
    /// treated as absent.
    pub fn new(password: Option<String>) -> Self {
        Self {
            password: password.filter(|p| !p.is_empty()),
        }
    }

    /// A credential with no password.
    pub fn none() -> Self {
        Self::default()
    }

    /// The password, if one was supplied.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Whether a password was supplied.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Drop the stored password.
    pub fn clear(&mut self) {
        self.password = None;
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field(
                "password",
                &self.password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}
