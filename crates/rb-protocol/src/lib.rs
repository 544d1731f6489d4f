// rb-protocol: Control channel message types for the remote-boot endpoint.
//
// Every WebSocket text frame carries one JSON object with a top-level
// `action` field used for discriminated deserialization.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Endpoint -> Coordinator messages
// ---------------------------------------------------------------------------

/// Registration message.
///
/// Sent exactly once per opened channel, before any other outbound message.
/// Lists every identity key this endpoint manages, including aliases that
/// resolve to the same physical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    pub uuids: Vec<String>,
}

/// Result of a single echo probe.
///
/// `ping_ms` is always serialized; `null` means the device did not answer
/// within the probe timeout (or the probe failed for any other reason).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResult {
    pub uuid: String,
    pub ping_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// Coordinator -> Endpoint messages
// ---------------------------------------------------------------------------

/// A request that names one managed device by identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequest {
    pub uuid: String,
}

// ---------------------------------------------------------------------------
// Top-level discriminated union
// ---------------------------------------------------------------------------

/// All control channel messages.
///
/// Serializes/deserializes using the `action` field as a tag.
///
/// ```json
/// { "action": "request_ping", "uuid": "k1" }
/// ```
///
/// Older coordinators send `boot` instead of `request_boot`; both decode to
/// [`WsMessage::RequestBoot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
#[serde(rename_all = "snake_case")]
pub enum WsMessage {
    Register(Register),
    Ping(PingResult),
    #[serde(alias = "boot")]
    RequestBoot(DeviceRequest),
    RequestPing(DeviceRequest),
}

impl WsMessage {
    /// Decode one text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode as a single-line JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The `action` tag this message is sent under.
    pub fn action(&self) -> &'static str {
        match self {
            WsMessage::Register(_) => "register",
            WsMessage::Ping(_) => "ping",
            WsMessage::RequestBoot(_) => "request_boot",
            WsMessage::RequestPing(_) => "request_ping",
        }
    }
}

/// Query string identifying this peer to the coordinator.
pub const ENDPOINT_QUERY: &str = "tgt=remote_boot&client_type=endpoint";
