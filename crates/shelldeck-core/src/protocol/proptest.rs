//! Property-based tests for the wire format.

use proptest::prelude::*;

use crate::session::{Credential, SessionDescriptor};

use super::{ControlFrame, Disconnect, Geometry, Handshake};

fn descriptor(id: String) -> SessionDescriptor {
    SessionDescriptor {
        id,
        name: "prop".into(),
        host: "localhost".into(),
        port: 22,
        username: "root".into(),
    }
}

proptest! {
    #[test]
    fn handshake_round_trips(
        id in "[a-zA-Z0-9_-]{1,32}",
        cols in 1u16..=500,
        rows in 1u16..=200,
        password in proptest::option::of("[ -~]{1,32}"),
    ) {
        let credential = Credential::new(password.clone());
        let hs = Handshake::for_session(&descriptor(id), Geometry::new(cols, rows), &credential);
        let json = hs.to_json().unwrap();
        let back: Handshake = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&back, &hs);
        // auth travels if and only if a password was supplied
        prop_assert_eq!(back.auth.is_some(), password.is_some());
        prop_assert_eq!(json.contains("\"auth\""), password.is_some());
    }

    #[test]
    fn resize_round_trips(cols in 1u16..=500, rows in 1u16..=200) {
        let frame = ControlFrame::resize(Geometry::new(cols, rows));
        let json = frame.to_json().unwrap();
        let starts_with_resize = json.starts_with(r#"{"type":"resize""#);
        prop_assert!(starts_with_resize);
        let back: ControlFrame = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, frame);
    }

    #[test]
    fn close_classification_is_total(code in 0u16..=u16::MAX, reason in "[ -~]{0,32}") {
        let d = Disconnect::from_close_code(code, reason.clone());
        prop_assert_eq!(d.is_clean(), code == 1000);
        prop_assert_eq!(d.code(), code);
        prop_assert_eq!(d.reason(), reason.as_str());
    }
}
