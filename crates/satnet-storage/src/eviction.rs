//! Capacity eviction policy
//!
//! Shared by every backend so the in-memory and durable stores evict the
//! same victim for the same contents.

use chrono::{DateTime, Utc};
use satnet_core::{BundleId, Priority};

use crate::record::{BundleStatus, StoredBundleRecord};

/// The fields of a record that eviction looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub id: BundleId,
    pub priority: Priority,
    pub status: BundleStatus,
    pub stored_at: DateTime<Utc>,
    pub sequence: u64,
}

impl From<&StoredBundleRecord> for EvictionCandidate {
    fn from(record: &StoredBundleRecord) -> Self {
        Self {
            id: record.bundle.id,
            priority: record.bundle.priority,
            status: record.status,
            stored_at: record.stored_at,
            sequence: record.sequence,
        }
    }
}

impl EvictionCandidate {
    /// Sort key: terminal records first, then lowest priority, then oldest
    fn key(&self) -> (bool, Priority, DateTime<Utc>, u64) {
        (
            !self.status.is_terminal(),
            self.priority,
            self.stored_at,
            self.sequence,
        )
    }
}

/// Pick the record to evict so a bundle of `incoming` priority fits
///
/// Delivered and failed records are always evictable. Otherwise the victim
/// is the lowest-priority, oldest-stored record, and it is evicted only if
/// its priority is strictly lower than `incoming`. Returns `None` when no
/// room can be made.
pub fn select_victim<I>(candidates: I, incoming: Priority) -> Option<BundleId>
where
    I: IntoIterator<Item = EvictionCandidate>,
{
    let victim = candidates.into_iter().min_by_key(EvictionCandidate::key)?;

    if victim.status.is_terminal() || victim.priority < incoming {
        Some(victim.id)
    } else {
        None
    }
}
