//! DTN Bundle - the atomic unit of transfer
//!
//! A Bundle carries an opaque payload between two endpoints together with
//! the metadata needed for store-and-forward delivery: lifetime, priority,
//! hop count and an integrity hash computed at creation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::eid::Eid;
use crate::error::BundleError;

/// Bundle protocol version carried on the wire
pub const BUNDLE_VERSION: u8 = 7;

/// Maximum number of hops a bundle may take
pub const MAX_HOP_COUNT: u8 = 255;

/// Default bundle lifetime (24 hours)
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Globally unique bundle identifier
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct BundleId(Uuid);

impl BundleId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap raw UUID bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Raw UUID bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for BundleId {
    fn default() -> Self {
        Self::new()
    }
}

/// Bundle priority
///
/// Ordered so that `Bulk < Normal < Expedited`; the ordering drives both
/// store eviction and egress scheduling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Priority {
    /// Lowest priority, high delay tolerance
    Bulk = 0,
    /// Normal delivery (default)
    #[default]
    Normal = 1,
    /// Highest priority
    Expedited = 2,
}

impl Priority {
    /// All priorities, lowest first
    pub const ALL: [Priority; 3] = [Priority::Bulk, Priority::Normal, Priority::Expedited];

    /// Wire encoding of the priority
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a wire priority, returning `None` for unknown values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Priority::Bulk),
            1 => Some(Priority::Normal),
            2 => Some(Priority::Expedited),
            _ => None,
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.as_u8()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::from_u8(value).ok_or_else(|| format!("unknown priority {value}"))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Bulk => write!(f, "bulk"),
            Priority::Normal => write!(f, "normal"),
            Priority::Expedited => write!(f, "expedited"),
        }
    }
}

/// SHA-256 digest over a bundle's endpoints, creation time and payload
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegrityHash(pub [u8; 32]);

impl IntegrityHash {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for IntegrityHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IntegrityHash({})", &self.to_hex()[..16])
    }
}

impl std::fmt::Display for IntegrityHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for IntegrityHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IntegrityHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("integrity hash must be 32 bytes"))?;
        Ok(Self(digest))
    }
}

/// A DTN bundle
///
/// Bundles are immutable value objects once validated. The only field that
/// changes on the way through the network is the hop count (and the
/// previous-node marker that travels with it), both set by [`Bundle::forwarded`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Unique identifier
    pub id: BundleId,
    /// Protocol version
    pub version: u8,
    /// Originating endpoint
    pub source: Eid,
    /// Final destination endpoint
    pub destination: Eid,
    /// Endpoint that receives status reports (defaults to the source)
    pub report_to: Eid,
    /// Creation time, millisecond precision
    pub creation_timestamp: DateTime<Utc>,
    /// How long the bundle stays deliverable after creation
    #[serde(rename = "lifetime_ms", with = "duration_ms")]
    pub lifetime: Duration,
    /// Priority class
    pub priority: Priority,
    /// Number of successful forwards so far
    pub hop_count: u8,
    /// Node that forwarded this copy to us, if any
    pub previous_node: Option<Eid>,
    /// Application data
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
    /// Digest computed at creation
    pub integrity_hash: IntegrityHash,
}

impl Bundle {
    /// Create a new bundle stamped with the current time
    pub fn new(
        source: impl Into<Eid>,
        destination: impl Into<Eid>,
        payload: Vec<u8>,
        priority: Priority,
        lifetime: Duration,
    ) -> Self {
        Self::new_at(source, destination, payload, priority, lifetime, Utc::now())
    }

    /// Create a new bundle with an explicit creation time
    ///
    /// The timestamp and lifetime are truncated to millisecond precision so
    /// the bundle survives a trip through the wire format unchanged.
    pub fn new_at(
        source: impl Into<Eid>,
        destination: impl Into<Eid>,
        payload: Vec<u8>,
        priority: Priority,
        lifetime: Duration,
        created_at: DateTime<Utc>,
    ) -> Self {
        let source = source.into();
        let destination = destination.into();
        let creation_timestamp = truncate_millis(created_at);
        let lifetime = truncate_duration_millis(lifetime);
        let integrity_hash =
            compute_integrity_hash(&source, &destination, creation_timestamp, &payload);

        Self {
            id: BundleId::new(),
            version: BUNDLE_VERSION,
            report_to: source.clone(),
            source,
            destination,
            creation_timestamp,
            lifetime,
            priority,
            hop_count: 0,
            previous_node: None,
            payload,
            integrity_hash,
        }
    }

    /// Set the report-to endpoint
    pub fn with_report_to(mut self, report_to: impl Into<Eid>) -> Self {
        self.report_to = report_to.into();
        self
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Instant after which the bundle is expired
    ///
    /// Returns `None` when the lifetime is too large to represent, in which
    /// case the bundle never expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let lifetime = chrono::Duration::from_std(self.lifetime).ok()?;
        self.creation_timestamp.checked_add_signed(lifetime)
    }

    /// Check if the bundle has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|deadline| now > deadline)
    }

    /// Time left before expiry, zero if already expired
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at()
            .and_then(|deadline| (deadline - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Recompute the digest over the current content
    pub fn hash(&self) -> IntegrityHash {
        compute_integrity_hash(
            &self.source,
            &self.destination,
            self.creation_timestamp,
            &self.payload,
        )
    }

    /// Check that the stored digest matches the content
    pub fn verify_integrity(&self) -> bool {
        self.hash() == self.integrity_hash
    }

    /// Deep copy with a freshly allocated payload buffer
    pub fn deep_clone(&self) -> Self {
        Self {
            payload: self.payload.to_vec(),
            ..self.clone()
        }
    }

    /// Deep copy under a new identity
    pub fn clone_with_new_id(&self) -> Self {
        Self {
            id: BundleId::new(),
            ..self.deep_clone()
        }
    }

    /// Produce the copy that goes on the wire when `by` forwards this bundle
    ///
    /// Increments the hop count and records `by` as the previous node. The
    /// stored original is left untouched.
    pub fn forwarded(&self, by: &Eid) -> Result<Self, BundleError> {
        let hop_count = self
            .hop_count
            .checked_add(1)
            .ok_or(BundleError::HopLimitExceeded {
                hop_count: self.hop_count,
                max: MAX_HOP_COUNT,
            })?;

        let mut copy = self.deep_clone();
        copy.hop_count = hop_count;
        copy.previous_node = Some(by.clone());
        Ok(copy)
    }

    /// Check whether this bundle can be forwarded once more
    pub fn can_forward(&self, max_hop_count: u8) -> bool {
        self.hop_count < max_hop_count
    }
}

impl std::fmt::Display for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Bundle[{}] {} -> {} ({}, {} bytes, hops={})",
            self.id,
            self.source,
            self.destination,
            self.priority,
            self.size(),
            self.hop_count
        )
    }
}

/// Compute the integrity digest over endpoints, creation time and payload
///
/// Each variable-length field is length-prefixed so that moving bytes
/// between fields changes the digest.
pub fn compute_integrity_hash(
    source: &Eid,
    destination: &Eid,
    creation_timestamp: DateTime<Utc>,
    payload: &[u8],
) -> IntegrityHash {
    let mut hasher = Sha256::new();
    for field in [source.as_str().as_bytes(), destination.as_str().as_bytes()] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field);
    }
    hasher.update(creation_timestamp.timestamp_millis().to_be_bytes());
    hasher.update((payload.len() as u64).to_be_bytes());
    hasher.update(payload);
    IntegrityHash(hasher.finalize().into())
}

fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

fn truncate_duration_millis(duration: Duration) -> Duration {
    Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod payload_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
