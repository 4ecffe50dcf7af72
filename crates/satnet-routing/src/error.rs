//! Error types for satnet-routing
//!
//! Routing itself only ever fails with
//! [`RoutingError::NoRouteAvailable`](satnet_core::RoutingError); the errors
//! here cover loading policy configuration and model artifacts.

use std::path::PathBuf;

use thiserror::Error;

/// Errors while loading a learned routing model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse model: {0}")]
    Parse(String),

    #[error("Model is missing a feature order")]
    MissingFeatureOrder,

    #[error("Unknown feature in model: {0}")]
    UnknownFeature(String),

    #[error("Model has no weights for priority {0}")]
    MissingPriorityWeights(u8),

    #[error("Weight length mismatch for priority {priority}: expected {expected}, got {actual}")]
    WeightLengthMismatch {
        priority: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid energy threshold for priority {priority}: {value}")]
    InvalidThreshold { priority: String, value: f64 },
}

/// Result type for model loading
pub type ModelResult<T> = Result<T, ModelError>;
