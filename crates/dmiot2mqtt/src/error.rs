//! Session error types.

use dmiot_mqtt_channel::MqttError;
use dmiot_protocol::ProtocolError;
use thiserror::Error;

/// Errors that end a device session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("broker error: {0}")]
    Broker(#[from] MqttError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Convenience alias for session results.
pub type SessionResult<T> = Result<T, SessionError>;
