//! Transport layer error types

use satnet_core::TransportError;
use thiserror::Error;

/// Errors that can occur during message framing
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Stream closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FramingError> for TransportError {
    fn from(err: FramingError) -> Self {
        match err {
            FramingError::MessageTooLarge { size, max } => TransportError::FrameTooLarge { size, max },
            FramingError::Closed => TransportError::ConnectionClosed,
            other => TransportError::SendFailed(other.to_string()),
        }
    }
}
