//! Contact-Graph Routing
//!
//! Scores every neighbor with an open contact by link quality, latency,
//! bandwidth and whether its EID lies on the path to the destination, and
//! picks the best. Candidates scoring under `min_score` are held back: a
//! bundle waits in the store for a better contact rather than being handed
//! to a poor, off-path relay.

use satnet_core::{Bundle, Neighbor, NeighborId, NeighborSnapshot, RoutingError};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::RoutingPolicy;
use crate::scoring::{ScoreWeights, Scored, best};

/// Default minimum score for a neighbor to be used
pub const DEFAULT_MIN_SCORE: f64 = 0.5;

/// Contact-graph router configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactGraphConfig {
    pub weights: ScoreWeights,
    pub min_score: f64,
}

impl Default for ContactGraphConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl ContactGraphConfig {
    /// Default weights with no minimum score, for callers that filter
    /// candidates themselves
    pub fn ranking_only() -> Self {
        Self {
            min_score: 0.0,
            ..Self::default()
        }
    }
}

/// Contact-Graph Router
#[derive(Debug, Clone, Default)]
pub struct ContactGraphRouter {
    config: ContactGraphConfig,
}

impl ContactGraphRouter {
    /// Create with default weights and threshold
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a configuration
    pub fn with_config(config: ContactGraphConfig) -> Self {
        Self { config }
    }

    /// Set the minimum score
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.config.min_score = min_score;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &ContactGraphConfig {
        &self.config
    }

    /// Choose among `candidates`, which the caller has already filtered
    pub(crate) fn select_among<'a, I>(&self, bundle: &Bundle, candidates: I) -> Result<NeighborId, RoutingError>
    where
        I: IntoIterator<Item = &'a Neighbor>,
    {
        let scored = candidates.into_iter().filter_map(|neighbor| {
            let score = self.config.weights.score(neighbor, bundle);
            if score < self.config.min_score {
                trace!(neighbor = %neighbor.id, score, "Below minimum route score");
                return None;
            }
            Some(Scored { neighbor, score })
        });

        best(scored).ok_or(RoutingError::NoRouteAvailable)
    }
}

impl RoutingPolicy for ContactGraphRouter {
    fn name(&self) -> &'static str {
        "contact_graph"
    }

    fn select_next_hop(
        &self,
        bundle: &Bundle,
        neighbors: &NeighborSnapshot,
    ) -> Result<NeighborId, RoutingError> {
        self.select_among(bundle, neighbors.active())
    }
}
