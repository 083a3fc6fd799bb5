//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding device payloads or encoding server messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid envelope: {0}")]
    Decode(String),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Convenience alias for protocol results.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
