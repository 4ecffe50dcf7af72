//! Neighbor model
//!
//! A [`Neighbor`] is an adjacent node as last reported by the contact feed.
//! Routing policies never see the live neighbor table; they receive an
//! immutable [`NeighborSnapshot`] taken at the start of an egress cycle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eid::Eid;

/// Identifier of an adjacent node, as known to the transport
#[derive(
    Debug,
    Clone,
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
pub struct NeighborId(String);

impl NeighborId {
    /// Create a neighbor ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NeighborId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NeighborId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A known adjacent node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Transport-level identifier
    pub id: NeighborId,
    /// EID prefix this neighbor can route toward
    pub eid: Eid,
    /// Link quality estimate, 0.0 to 1.0
    pub link_quality: f64,
    /// One-way latency estimate
    pub latency: Duration,
    /// Bandwidth estimate in bytes per second
    pub bandwidth: u64,
    /// Battery level, 0.0 to 1.0; `None` for mains-powered neighbors
    pub battery_level: Option<f64>,
    /// Whether a contact window is currently open
    pub contact_active: bool,
    /// Last time we heard about or from this neighbor
    pub last_seen: DateTime<Utc>,
    /// End of the current contact window, if the feed predicted one
    pub valid_until: Option<DateTime<Utc>>,
    /// Transport address, for transports that dial by address
    pub address: Option<String>,
}

impl Neighbor {
    /// Create an active neighbor with neutral link estimates
    pub fn new(id: impl Into<NeighborId>, eid: impl Into<Eid>) -> Self {
        Self {
            id: id.into(),
            eid: eid.into(),
            link_quality: 1.0,
            latency: Duration::ZERO,
            bandwidth: 0,
            battery_level: None,
            contact_active: true,
            last_seen: Utc::now(),
            valid_until: None,
            address: None,
        }
    }

    /// Set the link quality (clamped to 0.0..=1.0)
    pub fn with_link_quality(mut self, quality: f64) -> Self {
        self.link_quality = quality.clamp(0.0, 1.0);
        self
    }

    /// Set the latency estimate
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set the bandwidth estimate in bytes per second
    pub fn with_bandwidth(mut self, bandwidth: u64) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Set the battery level (clamped to 0.0..=1.0)
    pub fn with_battery(mut self, level: f64) -> Self {
        self.battery_level = Some(level.clamp(0.0, 1.0));
        self
    }

    /// Set whether the contact is active
    pub fn with_contact_active(mut self, active: bool) -> Self {
        self.contact_active = active;
        self
    }

    /// Set the end of the contact window
    pub fn with_valid_until(mut self, until: DateTime<Utc>) -> Self {
        self.valid_until = Some(until);
        self
    }

    /// Set the transport address
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Check whether the contact window has closed at `now`
    pub fn window_closed(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| now > until)
    }

    /// Active and inside its contact window at `now`
    pub fn in_contact(&self, now: DateTime<Utc>) -> bool {
        self.contact_active && !self.window_closed(now)
    }

    /// Fold a contact feed update into this neighbor
    pub fn apply(&mut self, update: &NeighborUpdate, now: DateTime<Utc>) {
        self.eid = update.eid.clone();
        self.link_quality = update.link_quality.clamp(0.0, 1.0);
        self.latency = update.latency;
        self.bandwidth = update.bandwidth;
        self.battery_level = update.battery_level.map(|b| b.clamp(0.0, 1.0));
        self.contact_active = update.contact_active;
        self.valid_until = update.valid_until;
        if update.address.is_some() {
            self.address = update.address.clone();
        }
        self.last_seen = now;
    }
}

/// Contact feed report about one neighbor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborUpdate {
    pub neighbor_id: NeighborId,
    pub eid: Eid,
    pub link_quality: f64,
    pub latency: Duration,
    pub bandwidth: u64,
    pub battery_level: Option<f64>,
    pub contact_active: bool,
    pub valid_until: Option<DateTime<Utc>>,
    pub address: Option<String>,
}

impl NeighborUpdate {
    /// Build a neighbor record from an update for a previously unknown neighbor
    pub fn into_neighbor(self, now: DateTime<Utc>) -> Neighbor {
        let mut neighbor = Neighbor::new(self.neighbor_id.clone(), self.eid.clone());
        neighbor.apply(&self, now);
        neighbor
    }
}

impl From<&Neighbor> for NeighborUpdate {
    fn from(n: &Neighbor) -> Self {
        Self {
            neighbor_id: n.id.clone(),
            eid: n.eid.clone(),
            link_quality: n.link_quality,
            latency: n.latency,
            bandwidth: n.bandwidth,
            battery_level: n.battery_level,
            contact_active: n.contact_active,
            valid_until: n.valid_until,
            address: n.address.clone(),
        }
    }
}

/// Immutable view of the neighbor table handed to routing policies
#[derive(Debug, Clone, Default)]
pub struct NeighborSnapshot {
    neighbors: Vec<Neighbor>,
    taken_at: DateTime<Utc>,
}

impl NeighborSnapshot {
    /// Build a snapshot; neighbors are ordered by ID so routing is deterministic
    pub fn new(mut neighbors: Vec<Neighbor>, taken_at: DateTime<Utc>) -> Self {
        neighbors.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            neighbors,
            taken_at,
        }
    }

    /// Time the snapshot was taken
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// All neighbors, ordered by ID
    pub fn all(&self) -> &[Neighbor] {
        &self.neighbors
    }

    /// Neighbors with an open contact at snapshot time
    pub fn active(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors
            .iter()
            .filter(move |n| n.in_contact(self.taken_at))
    }

    /// Look up a neighbor by ID
    pub fn get(&self, id: &NeighborId) -> Option<&Neighbor> {
        self.neighbors.iter().find(|n| &n.id == id)
    }

    /// Number of neighbors
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_builder_clamps() {
        let n = Neighbor::new("relay-1", "dtn://mars")
            .with_link_quality(1.7)
            .with_battery(-0.2);

        assert_eq!(n.link_quality, 1.0);
        assert_eq!(n.battery_level, Some(0.0));
        assert!(n.contact_active);
    }

    #[test]
    fn test_contact_window() {
        let now = Utc::now();
        let n = Neighbor::new("sat-3", "dtn://leo/sat-3")
            .with_valid_until(now + chrono::Duration::minutes(5));

        assert!(n.in_contact(now));
        assert!(!n.in_contact(now + chrono::Duration::minutes(6)));
        assert!(!n.clone().with_contact_active(false).in_contact(now));
    }

    #[test]
    fn test_apply_update_keeps_address_when_absent() {
        let now = Utc::now();
        let mut n = Neighbor::new("relay-1", "dtn://mars").with_address("10.0.0.7:4556");
        let mut update = NeighborUpdate::from(&n);
        update.address = None;
        update.link_quality = 0.4;
        update.contact_active = false;

        n.apply(&update, now);
        assert_eq!(n.address.as_deref(), Some("10.0.0.7:4556"));
        assert_eq!(n.link_quality, 0.4);
        assert!(!n.contact_active);
        assert_eq!(n.last_seen, now);
    }

    #[test]
    fn test_snapshot_ordering_and_active_filter() {
        let now = Utc::now();
        let snapshot = NeighborSnapshot::new(
            vec![
                Neighbor::new("c", "dtn://c"),
                Neighbor::new("a", "dtn://a").with_contact_active(false),
                Neighbor::new("b", "dtn://b"),
            ],
            now,
        );

        let ids: Vec<_> = snapshot.all().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(snapshot.active().count(), 2);
        assert!(snapshot.get(&NeighborId::new("a")).is_some());
        assert_eq!(snapshot.len(), 3);
    }
}
