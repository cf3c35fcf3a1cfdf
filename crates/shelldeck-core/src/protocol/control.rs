//! Tagged control frames sent after the handshake.

use serde::{Deserialize, Serialize};

use crate::Result;

use super::Geometry;

/// Control frame on the outbound channel.
///
/// Control frames share the socket with raw input frames and are
/// distinguished by the `type` tag. Ordering relative to input therefore
/// matters; the single relay task preserves submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// The terminal surface's geometry changed while the session is open.
    Resize {
        /// New column count.
        cols: u16,
        /// New row count.
        rows: u16,
    },
}

impl ControlFrame {
    /// Build a resize notification for the given geometry.
    pub fn resize(geometry: Geometry) -> Self {
        ControlFrame::Resize {
            cols: geometry.cols,
            rows: geometry.rows,
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_wire_form() {
        let frame = ControlFrame::resize(Geometry::new(100, 30));
        assert_eq!(
            frame.to_json().unwrap(),
            r#"{"type":"resize","cols":100,"rows":30}"#
        );
    }

    #[test]
    fn resize_parses() {
        let frame: ControlFrame =
            serde_json::from_str(r#"{"type":"resize","cols":80,"rows":24}"#).unwrap();
        assert_eq!(frame, ControlFrame::Resize { cols: 80, rows: 24 });
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let result = serde_json::from_str::<ControlFrame>(r#"{"type":"ping"}"#);
        assert!(result.is_err());
    }
}
