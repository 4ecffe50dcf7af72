//! Error types for the DTN node

use satnet_core::{BundleError, CodecError, TransportError};
use satnet_storage::StoreError;
use thiserror::Error;

/// Errors that can occur in the DTN node
#[derive(Debug, Error)]
pub enum NodeError {
    /// Node already started
    #[error("Node already started")]
    AlreadyStarted,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Bundle failed validation
    #[error("Invalid bundle: {0}")]
    Bundle(#[from] BundleError),

    /// Bundle could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for node operations
pub type NodeResult<T> = Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: NodeError = BundleError::EmptySource.into();
        assert!(matches!(err, NodeError::Bundle(_)));

        let err: NodeError = StoreError::StoreFull { capacity: 3 }.into();
        assert!(format!("{}", err).contains("capacity: 3"));

        let err: NodeError = TransportError::Timeout.into();
        assert!(matches!(err, NodeError::Transport(TransportError::Timeout)));
    }
}
