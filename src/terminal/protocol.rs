//! koko terminal channel wire format
//!
//! Every frame is a JSON object `{"id", "type", "data"}`. `id` is the
//! correlation id the server hands out in its CONNECT frame; `data` is a
//! string whose meaning depends on `type` (terminal bytes, or a nested JSON
//! geometry object for INIT/RESIZE).

use serde::{Deserialize, Serialize};

use super::error::TerminalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Ping,
    Pong,
    Connect,
    Close,
    TerminalInit,
    TerminalData,
    TerminalResize,
    /// Any type this client does not know about
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub data: String,
}

/// Terminal size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalGeometry {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalGeometry {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl ChannelMessage {
    pub fn new(id: impl Into<String>, kind: MessageType, data: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            data: data.into(),
        }
    }

    pub fn terminal_init(id: &str, geometry: TerminalGeometry) -> Self {
        Self::new(id, MessageType::TerminalInit, geometry_payload(geometry))
    }

    pub fn terminal_resize(id: &str, geometry: TerminalGeometry) -> Self {
        Self::new(id, MessageType::TerminalResize, geometry_payload(geometry))
    }

    pub fn terminal_data(id: &str, data: impl Into<String>) -> Self {
        Self::new(id, MessageType::TerminalData, data)
    }

    pub fn decode(text: &str) -> Result<Self, TerminalError> {
        serde_json::from_str(text)
            .map_err(|e| TerminalError::Protocol(format!("malformed frame: {}", e)))
    }

    pub fn encode(&self) -> Result<String, TerminalError> {
        serde_json::to_string(self)
            .map_err(|e| TerminalError::Protocol(format!("failed to encode frame: {}", e)))
    }

    /// Geometry carried by a TERMINAL_INIT or TERMINAL_RESIZE frame.
    pub fn geometry(&self) -> Result<TerminalGeometry, TerminalError> {
        serde_json::from_str(&self.data)
            .map_err(|e| TerminalError::Protocol(format!("malformed geometry: {}", e)))
    }
}

fn geometry_payload(geometry: TerminalGeometry) -> String {
    format!(r#"{{"cols":{},"rows":{}}}"#, geometry.cols, geometry.rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_connect() {
        let msg = ChannelMessage::decode(r#"{"id":"abc","type":"CONNECT","data":""}"#).unwrap();
        assert_eq!(msg.id, "abc");
        assert_eq!(msg.kind, MessageType::Connect);
    }

    #[test]
    fn test_decode_tolerates_missing_fields_and_unknown_types() {
        let msg = ChannelMessage::decode(r#"{"type":"TERMINAL_SHARE"}"#).unwrap();
        assert_eq!(msg.kind, MessageType::Unknown);
        assert_eq!(msg.id, "");
        assert_eq!(msg.data, "");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            ChannelMessage::decode("not json"),
            Err(TerminalError::Protocol(_))
        ));
        assert!(matches!(
            ChannelMessage::decode(r#"{"id":"abc"}"#),
            Err(TerminalError::Protocol(_))
        ));
    }

    #[test]
    fn test_init_frame_shape() {
        let msg = ChannelMessage::terminal_init("abc", TerminalGeometry::new(132, 43));
        let json: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["type"], "TERMINAL_INIT");
        assert_eq!(json["data"], r#"{"cols":132,"rows":43}"#);
        assert_eq!(msg.geometry().unwrap(), TerminalGeometry::new(132, 43));
    }

    #[test]
    fn test_resize_type_name() {
        let msg = ChannelMessage::terminal_resize("abc", TerminalGeometry::default());
        assert!(msg.encode().unwrap().contains(r#""type":"TERMINAL_RESIZE""#));
    }
}
