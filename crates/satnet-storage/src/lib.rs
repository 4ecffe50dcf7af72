//! # Satnet Storage
//!
//! Capacity-bounded persistence for DTN bundles.
//!
//! ## Features
//!
//! - **BundleStore trait**: the store contract the node depends on
//! - **InMemoryBundleStore**: lock-protected map, for tests and volatile nodes
//! - **RedbBundleStore**: durable store on redb, one write transaction per mutation
//! - **Eviction**: lowest-priority, oldest-first victim selection shared by both
//!
//! ## Example
//!
//! ```rust,ignore
//! use satnet_storage::{BundleFilter, BundleStore, InMemoryBundleStore};
//!
//! let store = InMemoryBundleStore::new(10_000);
//! store.put(bundle, Utc::now()).await?;
//! let pending = store.list(&BundleFilter::pending()).await?;
//! ```

pub mod error;
pub mod eviction;
pub mod memory;
pub mod record;
pub mod redb_store;

pub use error::{StoreError, StoreResult};
pub use eviction::{EvictionCandidate, select_victim};
pub use memory::InMemoryBundleStore;
pub use record::{BundleFilter, BundleStatus, PutOutcome, StatusCounts, StoredBundleRecord};
pub use redb_store::{RedbBundleStore, RedbStoreConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use satnet_core::{Bundle, BundleId};

/// Default store capacity in bundles
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Capacity-bounded bundle persistence
///
/// The store is the sole authority on which bundles exist. Every mutation is
/// atomic with respect to concurrent readers, and a bundle ID appears at most
/// once. Implementations must not hold internal locks across an `.await`.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Maximum number of records
    fn capacity(&self) -> usize;

    /// Insert a bundle in `Pending` status
    ///
    /// Re-storing a bundle that is already present is a no-op reporting
    /// [`PutOutcome::AlreadyStored`]. When the store is full the eviction
    /// policy picks a victim; victim removal and insertion happen as one
    /// atomic step.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyExpired`] if the bundle is expired at `now`
    /// - [`StoreError::StoreFull`] if no room can be made
    async fn put(&self, bundle: Bundle, now: DateTime<Utc>) -> StoreResult<PutOutcome>;

    /// Fetch a record
    async fn get(&self, id: &BundleId) -> StoreResult<StoredBundleRecord>;

    /// Remove a record; removing an absent record is not an error
    async fn delete(&self, id: &BundleId) -> StoreResult<()>;

    /// Snapshot of the records matching `filter`, in no particular order
    async fn list(&self, filter: &BundleFilter) -> StoreResult<Vec<StoredBundleRecord>>;

    /// Number of records
    async fn count(&self) -> StoreResult<usize>;

    /// Remove every record whose bundle is expired at `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize>;

    /// Move a record forward in its lifecycle
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the record is absent
    /// - [`StoreError::InvalidTransition`] if the move is backwards or out
    ///   of a terminal state
    async fn update_status(&self, id: &BundleId, status: BundleStatus) -> StoreResult<()>;

    /// Per-status record counts
    async fn status_counts(&self) -> StoreResult<StatusCounts>;

    /// Remove delivered and failed records stored before `older_than`
    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> StoreResult<usize>;
}
