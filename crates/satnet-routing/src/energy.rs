//! Energy-Aware Routing
//!
//! Battery level gates eligibility before any scoring happens. A bulk bundle
//! must never drain a relay that only has enough charge left for urgent
//! traffic, however good that relay's link is.

use satnet_core::{Bundle, Neighbor, NeighborId, NeighborSnapshot, Priority, RoutingError};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::RoutingPolicy;
use crate::contact_graph::{ContactGraphConfig, ContactGraphRouter};

/// Minimum battery level (0.0 to 1.0) a neighbor needs per bundle priority
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyThresholds {
    pub bulk: f64,
    pub normal: f64,
    pub expedited: f64,
}

impl Default for EnergyThresholds {
    fn default() -> Self {
        Self {
            bulk: 0.30,
            normal: 0.20,
            expedited: 0.10,
        }
    }
}

impl EnergyThresholds {
    /// Threshold for a priority
    pub fn min_for(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Bulk => self.bulk,
            Priority::Normal => self.normal,
            Priority::Expedited => self.expedited,
        }
    }

    /// Set the threshold for a priority
    pub fn set(&mut self, priority: Priority, value: f64) {
        match priority {
            Priority::Bulk => self.bulk = value,
            Priority::Normal => self.normal = value,
            Priority::Expedited => self.expedited = value,
        }
    }

    /// Whether `neighbor` has charge enough to carry a bundle of `priority`
    ///
    /// Neighbors that report no battery (mains-powered) are always eligible.
    pub fn is_eligible(&self, neighbor: &Neighbor, priority: Priority) -> bool {
        neighbor
            .battery_level
            .is_none_or(|level| level >= self.min_for(priority))
    }
}

/// Energy-Aware Router: battery filter, then contact-graph scoring
///
/// Battery level alone decides eligibility. Scoring only ranks the neighbors
/// that pass, so by default no minimum score applies.
#[derive(Debug, Clone)]
pub struct EnergyAwareRouter {
    thresholds: EnergyThresholds,
    scorer: ContactGraphRouter,
}

impl Default for EnergyAwareRouter {
    fn default() -> Self {
        Self {
            thresholds: EnergyThresholds::default(),
            scorer: ContactGraphRouter::with_config(ContactGraphConfig::ranking_only()),
        }
    }
}

impl EnergyAwareRouter {
    /// Create with default thresholds and scoring
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the battery thresholds
    pub fn with_thresholds(mut self, thresholds: EnergyThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the contact-graph scoring configuration
    pub fn with_scoring(mut self, config: ContactGraphConfig) -> Self {
        self.scorer = ContactGraphRouter::with_config(config);
        self
    }

    /// Get the thresholds
    pub fn thresholds(&self) -> &EnergyThresholds {
        &self.thresholds
    }
}

impl RoutingPolicy for EnergyAwareRouter {
    fn name(&self) -> &'static str {
        "energy_aware"
    }

    fn select_next_hop(
        &self,
        bundle: &Bundle,
        neighbors: &NeighborSnapshot,
    ) -> Result<NeighborId, RoutingError> {
        let eligible = neighbors.active().filter(|neighbor| {
            let ok = self.thresholds.is_eligible(neighbor, bundle.priority);
            if !ok {
                trace!(
                    neighbor = %neighbor.id,
                    battery = ?neighbor.battery_level,
                    priority = %bundle.priority,
                    "Neighbor below energy threshold"
                );
            }
            ok
        });

        self.scorer.select_among(bundle, eligible)
    }
}
