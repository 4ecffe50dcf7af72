//! Neighbor table
//!
//! The node's live view of adjacent nodes. Every operation takes the lock
//! for one synchronous step; routing only ever sees a [`NeighborSnapshot`].

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use satnet_core::{Neighbor, NeighborId, NeighborSnapshot, NeighborUpdate};
use tracing::{debug, info};

/// Thread-safe table of known neighbors
#[derive(Debug, Default)]
pub struct NeighborTable {
    neighbors: RwLock<HashMap<NeighborId, Neighbor>>,
}

impl NeighborTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a neighbor from a contact feed report
    ///
    /// Returns true when the neighbor was previously unknown.
    pub fn upsert(&self, update: NeighborUpdate, now: DateTime<Utc>) -> bool {
        let mut neighbors = self.neighbors.write();
        match neighbors.get_mut(&update.neighbor_id) {
            Some(existing) => {
                existing.apply(&update, now);
                false
            }
            None => {
                debug!(neighbor = %update.neighbor_id, eid = %update.eid, "New neighbor");
                let id = update.neighbor_id.clone();
                neighbors.insert(id, update.into_neighbor(now));
                true
            }
        }
    }

    /// Record that we heard from a neighbor; returns false if it is unknown
    pub fn touch(&self, id: &NeighborId, now: DateTime<Utc>) -> bool {
        match self.neighbors.write().get_mut(id) {
            Some(neighbor) => {
                neighbor.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Mark stale neighbors inactive
    ///
    /// A neighbor goes inactive when it has not been heard from within
    /// `timeout` or its contact window has closed. Neighbors are never
    /// removed; a later update reactivates them.
    pub fn sweep_liveness(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<NeighborId> {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let mut marked = Vec::new();

        for neighbor in self.neighbors.write().values_mut() {
            if !neighbor.contact_active {
                continue;
            }
            let silent = now.signed_duration_since(neighbor.last_seen) > timeout;
            if silent || neighbor.window_closed(now) {
                neighbor.contact_active = false;
                marked.push(neighbor.id.clone());
            }
        }

        if !marked.is_empty() {
            info!(count = marked.len(), "Neighbors marked inactive");
        }
        marked
    }

    /// Immutable copy of the table for routing
    pub fn snapshot(&self, now: DateTime<Utc>) -> NeighborSnapshot {
        NeighborSnapshot::new(self.neighbors.read().values().cloned().collect(), now)
    }

    /// Look up a neighbor
    pub fn get(&self, id: &NeighborId) -> Option<Neighbor> {
        self.neighbors.read().get(id).cloned()
    }

    /// Number of known neighbors
    pub fn len(&self) -> usize {
        self.neighbors.read().len()
    }

    /// Check if no neighbors are known
    pub fn is_empty(&self) -> bool {
        self.neighbors.read().is_empty()
    }

    /// Number of neighbors in contact at `now`
    pub fn active_count(&self, now: DateTime<Utc>) -> usize {
        self.neighbors
            .read()
            .values()
            .filter(|n| n.in_contact(now))
            .count()
    }
}
