//! Envelope types exchanged with the device.
//!
//! Inbound payloads decode into a [`DeviceMessage`]; everything the server
//! writes back is an [`Outbound`] (either a [`Reply`] or a [`Command`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// Protocol revision tag carried by every envelope.
pub const PROTOCOL_VERSION: &str = "zeico_3.0.0";

// ── Opcodes ───────────────────────────────────────────────────

/// Client request (device → server).
pub const ACTION_REQUEST: i64 = 1;
/// Command (server → device).
pub const ACTION_COMMAND: i64 = 4;
/// Acknowledgement / reply (server → device).
pub const ACTION_REPLY: i64 = 81;

// ── Resource identifiers ──────────────────────────────────────

pub const RESOURCE_STATUS: i64 = 127;
pub const RESOURCE_PROVISIONING: i64 = 2000;
pub const RESOURCE_AUTH: i64 = 2001;
pub const RESOURCE_COMMAND: i64 = 9031;

/// Reply status code for success.
pub const CODE_OK: i32 = 0;
/// Every command carries the same message id.
pub const COMMAND_MSG_ID: u64 = 0;

/// Placeholder identity handed to devices during provisioning.
/// The device never presents it back, so any value works.
const PLACEHOLDER_DEVICE_KEY: &str = "0000000000000000";
const PLACEHOLDER_DEVICE_ID: &str = "000000000000000000000000";

/// A raw envelope as sent by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: i64,
    pub resource_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn new(action: i64, resource_id: i64) -> Self {
        Self {
            action,
            resource_id,
            version: Some(PROTOCOL_VERSION.to_string()),
            msg_id: None,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A decoded device envelope, classified by what it asks of the server.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    /// `action=1, resource_id=2000`: device asks for an identity.
    Provisioning(Envelope),
    /// `action=1, resource_id=2001`: device authenticates.
    Auth(Envelope),
    /// `resource_id=127`: periodic status, acknowledged but never forwarded.
    Heartbeat(Envelope),
    /// Anything else, forwarded to the broker once authenticated.
    Report(Envelope),
}

impl DeviceMessage {
    /// Decode one payload read from the device.
    ///
    /// The payload must be a single JSON object with integer `action` and
    /// `resource_id` fields.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;
        if !value.is_object() {
            return Err(ProtocolError::Decode("payload is not a JSON object".into()));
        }
        let envelope: Envelope =
            serde_json::from_value(value).map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Ok(Self::classify(envelope))
    }

    pub fn classify(envelope: Envelope) -> Self {
        match (envelope.action, envelope.resource_id) {
            (ACTION_REQUEST, RESOURCE_PROVISIONING) => Self::Provisioning(envelope),
            (ACTION_REQUEST, RESOURCE_AUTH) => Self::Auth(envelope),
            (_, RESOURCE_STATUS) => Self::Heartbeat(envelope),
            _ => Self::Report(envelope),
        }
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Provisioning(e) | Self::Auth(e) | Self::Heartbeat(e) | Self::Report(e) => e,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        match self {
            Self::Provisioning(e) | Self::Auth(e) | Self::Heartbeat(e) | Self::Report(e) => e,
        }
    }

    pub fn resource_id(&self) -> i64 {
        self.envelope().resource_id
    }
}

/// Acknowledgement sent for every request the server answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub action: i64,
    pub resource_id: i64,
    pub version: String,
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Reply {
    /// Generic success reply echoing `resource_id`.
    pub fn ack(resource_id: i64) -> Self {
        Self {
            action: ACTION_REPLY,
            resource_id,
            version: PROTOCOL_VERSION.to_string(),
            code: CODE_OK,
            data: None,
        }
    }

    /// Reply to a provisioning request, carrying placeholder credentials.
    pub fn provisioning() -> Self {
        Self {
            data: Some(serde_json::json!({
                "device_key": PLACEHOLDER_DEVICE_KEY,
                "device_id": PLACEHOLDER_DEVICE_ID,
            })),
            ..Self::ack(RESOURCE_PROVISIONING)
        }
    }
}

/// Broker-originated instruction delivered to the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: i64,
    pub resource_id: i64,
    pub version: String,
    pub msg_id: u64,
    pub data: Value,
}

impl Command {
    pub fn new(data: Value) -> Self {
        Self {
            action: ACTION_COMMAND,
            resource_id: RESOURCE_COMMAND,
            version: PROTOCOL_VERSION.to_string(),
            msg_id: COMMAND_MSG_ID,
            data,
        }
    }
}

/// Everything the server writes to the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Reply(Reply),
    Command(Command),
}

impl Outbound {
    /// Encode as a compact JSON object without a trailing newline.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

impl From<Reply> for Outbound {
    fn from(reply: Reply) -> Self {
        Self::Reply(reply)
    }
}

impl From<Command> for Outbound {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}
