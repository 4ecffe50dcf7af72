//! In-memory bundle store
//!
//! Suitable for tests and for nodes that accept losing queued bundles on
//! restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use satnet_core::{Bundle, BundleId};
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::eviction::{EvictionCandidate, select_victim};
use crate::record::{BundleFilter, BundleStatus, PutOutcome, StatusCounts, StoredBundleRecord};
use crate::{BundleStore, DEFAULT_CAPACITY};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<BundleId, StoredBundleRecord>,
    next_sequence: u64,
}

/// In-memory implementation of [`BundleStore`]
///
/// A single `RwLock` guards the record map. It is only ever held for the
/// duration of one synchronous operation, which is what makes eviction and
/// status changes atomic to concurrent readers.
#[derive(Debug)]
pub struct InMemoryBundleStore {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl Default for InMemoryBundleStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InMemoryBundleStore {
    /// Create a store holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
}

#[async_trait]
impl BundleStore for InMemoryBundleStore {
    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn put(&self, bundle: Bundle, now: DateTime<Utc>) -> StoreResult<PutOutcome> {
        if bundle.is_expired(now) {
            return Err(StoreError::AlreadyExpired(bundle.id));
        }

        let mut inner = self.inner.write();
        if inner.records.contains_key(&bundle.id) {
            trace!(bundle_id = %bundle.id, "Bundle already stored");
            return Ok(PutOutcome::AlreadyStored);
        }

        let mut evicted = None;
        if inner.records.len() >= self.capacity {
            let victim = select_victim(
                inner.records.values().map(EvictionCandidate::from),
                bundle.priority,
            )
            .ok_or(StoreError::StoreFull {
                capacity: self.capacity,
            })?;
            inner.records.remove(&victim);
            debug!(victim = %victim, incoming = %bundle.id, "Evicted bundle to make room");
            evicted = Some(victim);
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        let id = bundle.id;
        inner
            .records
            .insert(id, StoredBundleRecord::new(bundle, now, sequence));

        Ok(match evicted {
            Some(evicted) => PutOutcome::StoredAfterEviction { evicted },
            None => PutOutcome::Stored,
        })
    }

    async fn get(&self, id: &BundleId) -> StoreResult<StoredBundleRecord> {
        self.inner
            .read()
            .records
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    async fn delete(&self, id: &BundleId) -> StoreResult<()> {
        self.inner.write().records.remove(id);
        Ok(())
    }

    async fn list(&self, filter: &BundleFilter) -> StoreResult<Vec<StoredBundleRecord>> {
        Ok(self
            .inner
            .read()
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.inner.read().records.len())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut inner = self.inner.write();
        let before = inner.records.len();
        inner
            .records
            .retain(|_, record| !record.bundle.is_expired(now));
        Ok(before - inner.records.len())
    }

    async fn update_status(&self, id: &BundleId, status: BundleStatus) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let record = inner.records.get_mut(id).ok_or(StoreError::NotFound(*id))?;

        if !record.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id: *id,
                from: record.status,
                to: status,
            });
        }
        record.status = status;
        Ok(())
    }

    async fn status_counts(&self) -> StoreResult<StatusCounts> {
        let mut counts = StatusCounts::default();
        for record in self.inner.read().records.values() {
            counts.record(record.status);
        }
        Ok(counts)
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        let mut inner = self.inner.write();
        let before = inner.records.len();
        inner
            .records
            .retain(|_, record| !(record.status.is_terminal() && record.stored_at < older_than));
        Ok(before - inner.records.len())
    }
}
