//! WebSocket Message Types
//!
//! Inbound frames are parsed once at the connection boundary into
//! [`InboundFrame`]; the hub dispatches on the variant and relays the
//! original text untouched.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::sink::{DeviceSnapshot, SinkResult, SERVO_POS_FIELD};

/// Literal frame body a device sends to claim the device slot
pub const IDENTIFY_TOKEN: &str = "ESP32";

/// A frame received from any connection
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// The identification handshake
    Identify,
    /// A well-formed structured record
    Record(Record),
    /// Anything else
    Malformed {
        /// Frame text as received (lossy for invalid UTF-8)
        raw: String,
        /// Why it could not be parsed
        error: FrameError,
    },
}

impl InboundFrame {
    /// Parse a text frame
    pub fn parse(raw: String) -> Self {
        if raw == IDENTIFY_TOKEN {
            return InboundFrame::Identify;
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => InboundFrame::Record(Record { raw, value }),
            Err(e) => InboundFrame::Malformed {
                raw,
                error: FrameError::Json(e.to_string()),
            },
        }
    }

    /// Parse a binary frame, which must carry UTF-8 text
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::parse(text),
            Err(e) => InboundFrame::Malformed {
                raw: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                error: FrameError::Utf8(e.utf8_error().to_string()),
            },
        }
    }
}

/// A structured record together with the exact text it arrived as
#[derive(Debug, Clone)]
pub struct Record {
    /// Original frame text, relayed verbatim
    pub raw: String,
    /// Parsed form, used only for inspection
    pub value: Value,
}

impl Record {
    /// Build the snapshot for this record, if it reports device state
    ///
    /// Presence check only: `{"servoPos": 0}` and `{"servoPos": null}` both count.
    pub fn snapshot(&self) -> Option<SinkResult<DeviceSnapshot>> {
        match self.value.as_object() {
            Some(fields) if fields.contains_key(SERVO_POS_FIELD) => {
                Some(DeviceSnapshot::from_fields(fields))
            }
            _ => None,
        }
    }
}

/// Why a frame was discarded as malformed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameError {
    #[error("Invalid UTF-8: {0}")]
    Utf8(String),

    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Device sent null instead of a state object")]
    NullState,
}

/// Control messages generated by the hub itself
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum HubNotice {
    /// The device connection closed
    #[serde(rename = "ESP32_DISCONNECTED")]
    DeviceDisconnected,
}

impl HubNotice {
    /// Wire form of the notice
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
