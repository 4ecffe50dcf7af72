//! Core types for the Satnet DTN node
//!
//! This crate holds everything the other Satnet crates agree on:
//!
//! - [`Bundle`]: the store-and-forward unit, with [`validate`] and the
//!   binary/JSON [`codec`]
//! - [`Eid`]: endpoint identifiers with segment-aware prefix matching
//! - [`Neighbor`], [`NeighborUpdate`] and [`NeighborSnapshot`]: the view of
//!   adjacent nodes that routing works from
//! - [`Transport`]: the byte-moving seam, with [`MockTransport`] for tests
//! - Error types shared across the workspace

pub mod bundle;
pub mod codec;
pub mod eid;
pub mod error;
pub mod mock_transport;
pub mod neighbor;
pub mod transport;
pub mod validation;

pub use bundle::{
    BUNDLE_VERSION, Bundle, BundleId, DEFAULT_LIFETIME, IntegrityHash, MAX_HOP_COUNT, Priority,
    compute_integrity_hash,
};
pub use codec::{decode, encode, from_json, to_json};
pub use eid::Eid;
pub use error::{
    BundleError, CodecError, RoutingError, SatnetError, SatnetResult, TransportError,
};
pub use mock_transport::{MockMessage, MockTransport, MockTransportBuilder};
pub use neighbor::{Neighbor, NeighborId, NeighborSnapshot, NeighborUpdate};
pub use transport::Transport;
pub use validation::{BundleLimits, DEFAULT_MAX_PAYLOAD_SIZE, validate};
