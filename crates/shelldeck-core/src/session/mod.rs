//! Session types shared between the controller and its collaborators.

mod descriptor;
mod state;

pub use descriptor::{Credential, SessionDescriptor};
pub use state::ConnectionState;
