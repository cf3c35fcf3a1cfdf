//! Integration tests for reconnect ordering, target switching, and the
//! stale-event guard around closing the session view.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use shelldeck_client::{ConnectionConfig, ControllerHandle, Notification, SessionController};
use shelldeck_core::session::{ConnectionState, Credential, SessionDescriptor};
use shelldeck_test_utils::{wait_for_state, wait_until, FakeSurface, MockBridge};

fn descriptor(id: &str) -> SessionDescriptor {
    SessionDescriptor {
        id: id.into(),
        name: id.into(),
        host: "10.0.0.7".into(),
        port: 22,
        username: "deploy".into(),
    }
}

fn start_controller(
    url: &str,
) -> (
    FakeSurface,
    ControllerHandle,
    UnboundedReceiver<Notification>,
) {
    let surface = FakeSurface::new();
    let config = ConnectionConfig {
        endpoint_url: url.to_string(),
        connect_timeout: Duration::from_secs(5),
    };
    let (controller, handle, notifications) = SessionController::new(config, surface.clone());
    tokio::spawn(controller.run());
    (surface, handle, notifications)
}

fn drain(notes: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = notes.try_recv() {
        out.push(n);
    }
    out
}

#[tokio::test]
async fn reconnect_waits_for_prior_close_before_new_handshake() {
    let mut bridge = MockBridge::start().await;
    let (_surface, handle, _notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let conn1 = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    // Park the bridge so the close handshake cannot complete yet.
    conn1.stall(Duration::from_millis(400));
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.reconnect();

    // The prior socket's close has not been observed: no new handshake.
    assert!(bridge
        .try_next_connection(Duration::from_millis(200))
        .await
        .is_none());

    // Once the bridge resumes and the close completes, the new attempt
    // goes out.
    let conn2 = bridge.next_connection().await;
    assert_eq!(conn2.handshake_json()["serverId"], "srv1");
    wait_for_state(&mut state, ConnectionState::is_open).await;
}

#[tokio::test]
async fn reconnect_after_clean_close_dials_again() {
    let mut bridge = MockBridge::start().await;
    let (_surface, handle, _notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let conn1 = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    conn1.close(1000, "");
    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Closed { .. })).await;

    handle.reconnect();
    let conn2 = bridge.next_connection().await;
    assert_eq!(conn2.handshake_json()["serverId"], "srv1");
    wait_for_state(&mut state, ConnectionState::is_open).await;
}

#[tokio::test]
async fn switching_servers_tears_down_before_dialing() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, _notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let _conn1 = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    // Connecting to a different server while open behaves as a reconnect
    // to the new target.
    handle.connect(descriptor("srv2"), Credential::none());

    let conn2 = bridge.next_connection().await;
    assert_eq!(conn2.handshake_json()["serverId"], "srv2");
    wait_for_state(&mut state, ConnectionState::is_open).await;

    // The surface was remounted for the new attempt.
    assert_eq!(surface.mount_count(), 2);
}

#[tokio::test]
async fn credential_is_reused_for_reconnect() {
    let mut bridge = MockBridge::start().await;
    let (_surface, handle, _notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::new(Some("x".into())));
    let conn1 = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    conn1.close(1000, "");
    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Closed { .. })).await;

    handle.reconnect();
    let conn2 = bridge.next_connection().await;
    assert_eq!(conn2.handshake_json()["auth"]["password"], "x");
}

#[tokio::test]
async fn closing_view_while_connecting_discards_late_open() {
    // A listener that accepts TCP but never answers the upgrade keeps the
    // attempt parked in Connecting for as long as the test needs.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let park = tokio::spawn(async move {
        let held = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(held);
    });

    let (surface, handle, mut notes) = start_controller(&url);
    handle.connect(descriptor("srv1"), Credential::none());

    let mut state = handle.state();
    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Connecting)).await;

    handle.close_view();
    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Idle)).await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    // No resurrection: whatever the superseded socket does later produces
    // no state change and no notification.
    assert_eq!(handle.current_state(), ConnectionState::Idle);
    assert!(surface.is_disposed());
    assert!(drain(&mut notes).is_empty());

    park.abort();
}

#[tokio::test]
async fn closing_view_ignores_subsequent_socket_events() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, mut notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let conn = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    conn.send_text("hello");
    let display = surface.clone();
    wait_until(move || display.written_string().contains("hello")).await;

    handle.close_view();
    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Idle)).await;
    drain(&mut notes);
    let writes_before = surface.writes().len();

    // Late traffic and an abnormal end from the superseded socket.
    conn.send_text("late");
    conn.sever();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(handle.current_state(), ConnectionState::Idle);
    assert_eq!(surface.writes().len(), writes_before);
    assert!(drain(&mut notes).is_empty());
}

#[tokio::test]
async fn close_view_while_open_performs_clean_shutdown() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, _notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let mut conn = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    handle.close_view();
    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Idle)).await;
    assert!(surface.is_disposed());

    // The bridge observes the socket ending without further frames.
    assert!(conn.try_next_frame(Duration::from_millis(500)).await.is_none());
}

#[tokio::test]
async fn input_typed_after_close_is_dropped_not_queued() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, _notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let conn1 = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    conn1.close(1000, "");
    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Closed { .. })).await;

    // The old subscription is still wired up, but the session is closed:
    // these units are discarded.
    surface.type_str("stale");

    handle.reconnect();
    let mut conn2 = bridge.next_connection().await;
    wait_for_state(&mut state, ConnectionState::is_open).await;

    // Nothing from before the reconnect leaked onto the new socket.
    assert!(conn2.try_next_frame(Duration::from_millis(200)).await.is_none());
}
