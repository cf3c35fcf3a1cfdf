//! shelldeck driver binary.
//!
//! Attaches one interactive terminal session to an inventoried server,
//! using the controlling TTY as the rendering surface. Window size changes
//! are propagated to the remote shell; Ctrl-C closes the session view.

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use shelldeck_client::{Cli, SessionController, StdioSurface};
use shelldeck_core::session::ConnectionState;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = shelldeck_core::init_logging(
        cli.verbose,
        cli.log_file.as_deref(),
        cli.log_format.into(),
    ) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "shelldeck starting");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to create runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(cli)) {
        error!(error = %e, "session failed");
        eprintln!("shelldeck: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> shelldeck_core::Result<()> {
    let descriptor = cli.descriptor();
    info!(
        server = %descriptor.id,
        endpoint = %descriptor.endpoint(),
        user = %descriptor.username,
        "connecting"
    );

    let (controller, handle, mut notifications) =
        SessionController::new(cli.connection_config(), StdioSurface::new());
    let mut state = handle.state();
    tokio::spawn(controller.run());

    handle.connect(descriptor, cli.credential());

    let mut winch = signal(SignalKind::window_change())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing session");
                handle.close_view();
                handle.shutdown();
                break;
            }
            _ = winch.recv() => handle.viewport_changed(),
            notification = notifications.recv() => match notification {
                Some(n) if n.is_error() => warn!("{n}"),
                Some(n) => info!("{n}"),
                None => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                if matches!(
                    current,
                    ConnectionState::Closed { .. } | ConnectionState::Failed { .. }
                ) {
                    // No automatic retry; rerun to reconnect.
                    handle.shutdown();
                    break;
                }
            }
        }
    }

    // Flush any notifications that raced the final state change.
    while let Ok(n) = notifications.try_recv() {
        if n.is_error() {
            warn!("{n}");
        } else {
            info!("{n}");
        }
    }

    Ok(())
}
