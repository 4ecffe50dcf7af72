//! Node statistics
//!
//! Counters are bumped lock-free from the workers; a [`StatsSnapshot`]
//! combines them with store and neighbor-table counts for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Running counters
#[derive(Debug, Default)]
pub struct NodeStats {
    pub received: AtomicU64,
    pub submitted: AtomicU64,
    pub duplicates: AtomicU64,
    pub delivered_locally: AtomicU64,
    pub dropped_malformed: AtomicU64,
    pub rejected_invalid: AtomicU64,
    pub store_full_drops: AtomicU64,
    pub forwarded: AtomicU64,
    pub send_failures: AtomicU64,
    pub hop_limit_failures: AtomicU64,
    pub expired_purged: AtomicU64,
    pub egress_cycles: AtomicU64,
}

impl NodeStats {
    /// Increment a counter
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add to a counter
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read all counters
    pub fn counters(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            received: load(&self.received),
            submitted: load(&self.submitted),
            duplicates: load(&self.duplicates),
            delivered_locally: load(&self.delivered_locally),
            dropped_malformed: load(&self.dropped_malformed),
            rejected_invalid: load(&self.rejected_invalid),
            store_full_drops: load(&self.store_full_drops),
            forwarded: load(&self.forwarded),
            send_failures: load(&self.send_failures),
            hop_limit_failures: load(&self.hop_limit_failures),
            expired_purged: load(&self.expired_purged),
            egress_cycles: load(&self.egress_cycles),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub received: u64,
    pub submitted: u64,
    pub duplicates: u64,
    pub delivered_locally: u64,
    pub dropped_malformed: u64,
    pub rejected_invalid: u64,
    pub store_full_drops: u64,
    pub forwarded: u64,
    pub send_failures: u64,
    pub hop_limit_failures: u64,
    pub expired_purged: u64,
    pub egress_cycles: u64,
}

/// Read-only view of the node for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub pending: usize,
    pub in_transit: usize,
    pub delivered: usize,
    pub failed: usize,
    pub neighbor_count: usize,
    pub active_neighbor_count: usize,
    pub counters: CounterSnapshot,
}
