//! Neighbor scoring shared by the contact-graph family of routers

use std::cmp::Ordering;
use std::time::Duration;

use satnet_core::{Bundle, Neighbor, NeighborId};
use serde::{Deserialize, Serialize};

/// Bandwidth at which the bandwidth score saturates (1 MB/s)
pub const REFERENCE_BANDWIDTH: u64 = 1_000_000;

/// Weights for the contact-graph score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub link_quality: f64,
    pub latency: f64,
    pub bandwidth: f64,
    /// Flat bonus when the neighbor's EID is a prefix of the destination
    pub path_match: f64,
    /// Bandwidth that scores 1.0, in bytes per second
    pub reference_bandwidth: u64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            link_quality: 0.3,
            latency: 0.2,
            bandwidth: 0.2,
            path_match: 0.3,
            reference_bandwidth: REFERENCE_BANDWIDTH,
        }
    }
}

impl ScoreWeights {
    /// Weighted score of `neighbor` as next hop for `bundle`
    pub fn score(&self, neighbor: &Neighbor, bundle: &Bundle) -> f64 {
        let mut score = self.link_quality * neighbor.link_quality.clamp(0.0, 1.0)
            + self.latency * inverse_latency_score(neighbor.latency)
            + self.bandwidth * bandwidth_score(neighbor.bandwidth, self.reference_bandwidth);
        if path_match(neighbor, bundle) {
            score += self.path_match;
        }
        score
    }
}

/// `1 / (1 + latency_seconds)`: 1.0 for a zero-latency link, falling toward 0
pub fn inverse_latency_score(latency: Duration) -> f64 {
    1.0 / (1.0 + latency.as_secs_f64())
}

/// `1 - min(latency / 10s, 1)`: the latency feature learned models are trained on
pub fn linear_latency_score(latency: Duration) -> f64 {
    1.0 - (latency.as_secs_f64() / 10.0).min(1.0)
}

/// Bandwidth normalized against `reference`, capped at 1.0
pub fn bandwidth_score(bandwidth: u64, reference: u64) -> f64 {
    if reference == 0 {
        return 0.0;
    }
    (bandwidth as f64 / reference as f64).min(1.0)
}

/// Whether the neighbor's EID is a prefix of the bundle's destination
pub fn path_match(neighbor: &Neighbor, bundle: &Bundle) -> bool {
    neighbor.eid.is_prefix_of(&bundle.destination)
}

/// A neighbor with its score
#[derive(Debug, Clone, Copy)]
pub struct Scored<'a> {
    pub neighbor: &'a Neighbor,
    pub score: f64,
}

impl Scored<'_> {
    /// Ranking order: higher score first, then lower latency, then ID
    fn rank(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.neighbor.latency.cmp(&other.neighbor.latency))
            .then_with(|| self.neighbor.id.cmp(&other.neighbor.id))
    }
}

/// Pick the best-ranked candidate
pub fn best<'a, I>(candidates: I) -> Option<NeighborId>
where
    I: IntoIterator<Item = Scored<'a>>,
{
    candidates
        .into_iter()
        .min_by(|a, b| a.rank(b))
        .map(|best| best.neighbor.id.clone())
}
