//! Handshake message.

use serde::{Deserialize, Serialize};

use crate::session::{Credential, SessionDescriptor};
use crate::Result;

use super::Geometry;

/// First outbound frame on every newly opened socket.
///
/// Binds the transport-level socket to a logical remote session and
/// communicates the initial terminal geometry. Sent exactly once per
/// socket, before any other outbound traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Inventory identifier of the target server.
    pub server_id: String,
    /// Initial terminal columns.
    pub cols: u16,
    /// Initial terminal rows.
    pub rows: u16,
    /// Optional credentials. Omitted entirely when no password was
    /// supplied; the bridge distinguishes a missing `auth` object from an
    /// empty password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
}

/// Credential payload inside the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    /// Plain password, sent once and never persisted.
    pub password: String,
}

impl Handshake {
    /// Build the handshake for a connection attempt.
    pub fn for_session(
        descriptor: &SessionDescriptor,
        geometry: Geometry,
        credential: &Credential,
    ) -> Self {
        Self {
            server_id: descriptor.id.clone(),
            cols: geometry.cols,
            rows: geometry.rows,
            auth: credential.password().map(|password| Auth {
                password: password.to_string(),
            }),
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
