//! Error types for satnet-storage

use satnet_core::{BundleId, CodecError};
use thiserror::Error;

use crate::record::BundleStatus;

/// Errors that can occur in bundle store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bundle was already expired when offered to the store
    #[error("Bundle {0} is already expired")]
    AlreadyExpired(BundleId),

    /// No room could be made for the bundle
    #[error("Store full (capacity: {capacity})")]
    StoreFull { capacity: usize },

    /// Requested bundle is not in the store
    #[error("Bundle not found: {0}")]
    NotFound(BundleId),

    /// Status change would move backwards or out of a terminal state
    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: BundleId,
        from: BundleStatus,
        to: BundleStatus,
    },

    /// Stored bundle bytes failed to decode
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Error during record serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl StoreError {
    /// Create a new Database error
    pub fn database(message: impl std::fmt::Display) -> Self {
        Self::Database(message.to_string())
    }

    /// Whether the error leaves the store usable for other bundles
    pub fn is_bundle_local(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyExpired(_)
                | StoreError::StoreFull { .. }
                | StoreError::NotFound(_)
                | StoreError::InvalidTransition { .. }
        )
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
