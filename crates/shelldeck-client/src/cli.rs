//! Command-line interface for the shelldeck driver binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};

use shelldeck_core::constants::DEFAULT_ENDPOINT;
use shelldeck_core::session::{Credential, SessionDescriptor};
use shelldeck_core::LogFormat;

use crate::connection::ConnectionConfig;

/// Log output format for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

/// Attach an interactive terminal session to an inventoried server through
/// the shell bridge.
#[derive(Debug, Parser)]
#[command(name = "shelldeck", version, about)]
pub struct Cli {
    /// Shell bridge endpoint URL.
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub url: String,

    /// Inventory identifier of the target server.
    #[arg(long = "server-id")]
    pub server_id: String,

    /// Display name used in notifications; defaults to the server id.
    #[arg(long)]
    pub name: Option<String>,

    /// Remote host, as recorded in the inventory.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Remote port.
    #[arg(long, default_value_t = 22)]
    pub port: u16,

    /// Login user on the remote host.
    #[arg(long, default_value = "root")]
    pub username: String,

    /// Password for the handshake. Omitted from the handshake entirely
    /// when not given (or blank).
    #[arg(long)]
    pub password: Option<String>,

    /// Connection timeout in seconds.
    #[arg(long, default_value_t = 10)]
    pub connect_timeout: u64,

    /// Increase verbosity (-v warn, -vv info, -vvv debug, -vvvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log output format.
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// Session descriptor for the requested server.
    pub fn descriptor(&self) -> SessionDescriptor {
        SessionDescriptor {
            id: self.server_id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.server_id.clone()),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
        }
    }

    /// Credential from the command line, blank treated as absent.
    pub fn credential(&self) -> Credential {
        Credential::new(self.password.clone())
    }

    /// Connection configuration for the session controller.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            endpoint_url: self.url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout),
        }
    }
}
