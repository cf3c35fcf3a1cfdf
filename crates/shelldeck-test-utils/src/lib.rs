//! Test utilities for shelldeck.
//!
//! Provides in-process doubles for both external collaborators of the
//! session core, so protocol logic can be tested without a rendering
//! engine or a real shell bridge:
//! - [`FakeSurface`]: records display writes and synthesizes keystrokes
//! - [`MockBridge`]: a scripted WebSocket server standing in for the
//!   SSH-to-socket bridge

mod fake_surface;
mod mock_bridge;

pub use fake_surface::FakeSurface;
pub use mock_bridge::{BridgeConnection, BridgeFrame, MockBridge};

use std::time::Duration;

use tokio::sync::watch;

use shelldeck_core::session::ConnectionState;

/// Await a connection state matching `pred`, panicking after five seconds.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    pred: impl Fn(&ConnectionState) -> bool,
) -> ConnectionState {
    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let current = rx.borrow_and_update().clone();
            if pred(&current) {
                return current;
            }
            if rx.changed().await.is_err() {
                panic!("controller stopped while waiting for state");
            }
        }
    })
    .await;
    match outcome {
        Ok(state) => state,
        Err(_) => panic!("timed out waiting for state"),
    }
}

/// Poll `cond` until it holds, panicking after two seconds.
pub async fn wait_until(cond: impl Fn() -> bool) {
    let outcome = tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if outcome.is_err() {
        panic!("timed out waiting for condition");
    }
}
