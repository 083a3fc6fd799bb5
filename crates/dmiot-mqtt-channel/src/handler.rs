//! Messages received on a session's subscriptions.

use rumqttc::Publish;

use crate::error::{MqttError, MqttResult};

/// A publish delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BrokerMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Decode the payload as an opaque JSON value.
    pub fn decode_json(&self) -> MqttResult<serde_json::Value> {
        serde_json::from_slice(&self.payload).map_err(|e| MqttError::Serialization(e.to_string()))
    }
}

impl From<&Publish> for BrokerMessage {
    fn from(publish: &Publish) -> Self {
        Self::new(publish.topic.clone(), publish.payload.to_vec())
    }
}
