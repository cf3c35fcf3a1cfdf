//! Integration tests for the terminal session core against the mock
//! bridge: handshake wire form, frame relaying, resize propagation, and
//! close classification.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use shelldeck_client::{ConnectionConfig, ControllerHandle, Notification, SessionController};
use shelldeck_core::protocol::Geometry;
use shelldeck_core::session::{ConnectionState, Credential, SessionDescriptor};
use shelldeck_test_utils::{wait_for_state, wait_until, BridgeFrame, FakeSurface, MockBridge};

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
async fn handshake_without_password_omits_auth() {
    let mut bridge = MockBridge::start().await;
    let (_surface, handle, _notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());

    let conn = bridge.next_connection().await;
    assert_eq!(
        conn.handshake,
        r#"{"serverId":"srv1","cols":80,"rows":24}"#
    );

    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;
}

#[tokio::test]
async fn handshake_with_password_includes_auth() {
    let mut bridge = MockBridge::start().await;
    let (_surface, handle, _notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::new(Some("x".into())));

    let conn = bridge.next_connection().await;
    assert_eq!(
        conn.handshake,
        r#"{"serverId":"srv1","cols":80,"rows":24,"auth":{"password":"x"}}"#
    );
}

#[tokio::test]
async fn handshake_carries_current_surface_geometry() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, _notes) = start_controller(bridge.url());
    surface.set_geometry(Geometry::new(132, 43));

    handle.connect(descriptor("srv1"), Credential::none());

    let conn = bridge.next_connection().await;
    let json = conn.handshake_json();
    assert_eq!(json["cols"], 132);
    assert_eq!(json["rows"], 43);
}

#[tokio::test]
async fn inbound_frames_relayed_verbatim_in_order() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, _notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let conn = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    conn.send_text("abc");
    conn.send_binary(vec![0x1b, 0x5b, 0x48]);
    conn.send_text("def");

    let writes = surface.clone();
    wait_until(move || writes.writes().len() >= 3).await;
    assert_eq!(
        surface.writes(),
        vec![
            b"abc".to_vec(),
            vec![0x1b, 0x5b, 0x48],
            b"def".to_vec(),
        ]
    );
}

#[tokio::test]
async fn input_relayed_one_frame_per_unit_in_order() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, _notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let mut conn = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    assert!(surface.type_str("l"));
    assert!(surface.type_str("s"));
    assert!(surface.type_str("\r"));

    assert_eq!(conn.next_frame().await, BridgeFrame::Text("l".into()));
    assert_eq!(conn.next_frame().await, BridgeFrame::Text("s".into()));
    assert_eq!(conn.next_frame().await, BridgeFrame::Text("\r".into()));
}

#[tokio::test]
async fn input_before_connect_has_no_subscriber() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, _notes) = start_controller(bridge.url());

    // No connection attempt yet: keystrokes have nowhere to go.
    assert!(!surface.type_str("early"));

    handle.connect(descriptor("srv1"), Credential::none());
    let mut conn = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    // Nothing was queued; the socket only ever carries input typed while
    // open.
    assert!(conn.try_next_frame(Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn resize_sent_only_while_open_and_only_on_change() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, _notes) = start_controller(bridge.url());

    // Resize before any socket exists: nothing to send.
    handle.viewport_changed();

    handle.connect(descriptor("srv1"), Credential::none());
    let mut conn = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    surface.set_geometry(Geometry::new(100, 30));
    handle.viewport_changed();
    assert_eq!(
        conn.next_frame().await,
        BridgeFrame::Text(r#"{"type":"resize","cols":100,"rows":30}"#.into())
    );

    // Same geometry again: suppressed. The next frame the bridge sees is
    // the sentinel keystroke, proving nothing was sent in between.
    handle.viewport_changed();
    assert!(surface.type_str("z"));
    assert_eq!(conn.next_frame().await, BridgeFrame::Text("z".into()));
}

#[tokio::test]
async fn clean_close_transitions_to_closed_without_error() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, mut notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let conn = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    conn.close(1000, "session ended");

    let closed = wait_for_state(&mut state, |s| {
        matches!(s, ConnectionState::Closed { .. })
    })
    .await;
    assert_eq!(
        closed,
        ConnectionState::Closed {
            code: 1000,
            reason: "session ended".into()
        }
    );

    // The display appends a disconnect notice.
    let display = surface.clone();
    wait_until(move || display.written_string().ends_with("[Disconnected]\r\n")).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let notifications = drain(&mut notes);
    assert!(notifications
        .iter()
        .any(|n| matches!(n, Notification::Disconnected { .. })));
    assert!(notifications.iter().all(|n| !n.is_error()));
}

#[tokio::test]
async fn abnormal_close_reports_connection_lost_once() {
    let mut bridge = MockBridge::start().await;
    let (_surface, handle, mut notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let conn = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    conn.sever();

    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Failed { .. })).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let lost: Vec<_> = drain(&mut notes)
        .into_iter()
        .filter(|n| matches!(n, Notification::ConnectionLost { .. }))
        .collect();
    assert_eq!(
        lost,
        vec![Notification::ConnectionLost {
            server: "srv1".into()
        }]
    );
}

#[tokio::test]
async fn nonnormal_close_code_is_abnormal() {
    let mut bridge = MockBridge::start().await;
    let (_surface, handle, mut notes) = start_controller(bridge.url());

    handle.connect(descriptor("srv1"), Credential::none());
    let conn = bridge.next_connection().await;
    let mut state = handle.state();
    wait_for_state(&mut state, ConnectionState::is_open).await;

    conn.close(1011, "bridge crashed");

    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Failed { .. })).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut notes)
        .iter()
        .any(|n| matches!(n, Notification::ConnectionLost { .. })));
}

#[tokio::test]
async fn connect_failure_reports_connection_error() {
    // Nothing listens on this port.
    let (_surface, handle, mut notes) = start_controller("ws://127.0.0.1:9");

    handle.connect(descriptor("srv1"), Credential::none());

    let mut state = handle.state();
    wait_for_state(&mut state, |s| matches!(s, ConnectionState::Failed { .. })).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut notes)
        .iter()
        .any(|n| matches!(n, Notification::ConnectionError { .. })));
}

#[tokio::test]
async fn mount_failure_aborts_attempt_and_returns_to_idle() {
    let mut bridge = MockBridge::start().await;
    let (surface, handle, mut notes) = start_controller(bridge.url());
    surface.fail_next_mount();

    handle.connect(descriptor("srv1"), Credential::none());

    let failed = tokio::time::timeout(Duration::from_secs(5), notes.recv())
        .await
        .expect("timed out waiting for mount failure")
        .expect("controller stopped");
    assert!(matches!(failed, Notification::MountFailed { .. }));

    assert_eq!(handle.current_state(), ConnectionState::Idle);
    assert!(bridge
        .try_next_connection(Duration::from_millis(200))
        .await
        .is_none());
}
