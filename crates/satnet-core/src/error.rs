//! Error types for the Satnet DTN node

use thiserror::Error;

/// Top-level error type for Satnet core operations
#[derive(Debug, Error)]
pub enum SatnetError {
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Validation failures for a bundle
///
/// All of these are terminal: a bundle that fails validation is dropped
/// where the failure is detected and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error("Bundle has an empty source EID")]
    EmptySource,

    #[error("Bundle has an empty destination EID")]
    EmptyDestination,

    #[error("Hop limit exceeded (hop count: {hop_count}, max: {max})")]
    HopLimitExceeded { hop_count: u8, max: u8 },

    #[error("Bundle has expired")]
    Expired,

    #[error("Bundle exceeds maximum size (size: {size}, max: {max})")]
    SizeExceedsMax { size: usize, max: usize },
}

/// Errors produced while decoding a bundle from bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Malformed bundle header: {0}")]
    MalformedHeader(String),

    #[error("Truncated payload: expected {expected} bytes, got {actual}")]
    TruncatedPayload { expected: usize, actual: usize },

    #[error("Integrity hash mismatch")]
    HashMismatch,

    #[error("Field {field} too long to encode ({len} bytes)")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("JSON error: {0}")]
    Json(String),
}

/// Errors related to routing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("No route available to destination")]
    NoRouteAvailable,
}

/// Errors related to transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Peer not connected: {0}")]
    PeerNotConnected(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Operation timed out")]
    Timeout,
}

/// Result type alias for Satnet core operations
pub type SatnetResult<T> = Result<T, SatnetError>;
