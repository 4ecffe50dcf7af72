//! Learned routing
//!
//! Scores neighbors with per-priority linear weights trained offline. The
//! model artifact is a JSON document naming its feature order, so a model
//! trained with a different column layout is still read correctly.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use satnet_core::{Bundle, Neighbor, NeighborId, NeighborSnapshot, Priority, RoutingError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};

use crate::RoutingPolicy;
use crate::energy::EnergyThresholds;
use crate::error::{ModelError, ModelResult};
use crate::scoring::{REFERENCE_BANDWIDTH, Scored, bandwidth_score, best, linear_latency_score, path_match};

/// A model input column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    LinkQuality,
    LatencyScore,
    Bandwidth,
    ContactActive,
    PathMatch,
    EnergyScore,
}

impl Feature {
    /// All features in their canonical order
    pub const ALL: [Feature; 6] = [
        Feature::LinkQuality,
        Feature::LatencyScore,
        Feature::Bandwidth,
        Feature::ContactActive,
        Feature::PathMatch,
        Feature::EnergyScore,
    ];

    /// Name used in model artifacts
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::LinkQuality => "link_quality",
            Feature::LatencyScore => "latency_score",
            Feature::Bandwidth => "bandwidth",
            Feature::ContactActive => "contact_active",
            Feature::PathMatch => "path_match",
            Feature::EnergyScore => "energy_score",
        }
    }

    /// Value of this feature for `neighbor` carrying `bundle`
    fn extract(&self, neighbor: &Neighbor, bundle: &Bundle, snapshot: &NeighborSnapshot) -> f64 {
        match self {
            Feature::LinkQuality => neighbor.link_quality.clamp(0.0, 1.0),
            Feature::LatencyScore => linear_latency_score(neighbor.latency),
            Feature::Bandwidth => bandwidth_score(neighbor.bandwidth, REFERENCE_BANDWIDTH),
            Feature::ContactActive => indicator(neighbor.in_contact(snapshot.taken_at())),
            Feature::PathMatch => indicator(path_match(neighbor, bundle)),
            Feature::EnergyScore => energy_score(neighbor),
        }
    }
}

impl FromStr for Feature {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ModelError::UnknownFeature(s.to_string()))
    }
}

fn indicator(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

/// Battery level, or 1.0 for neighbors that do not report one
fn energy_score(neighbor: &Neighbor) -> f64 {
    neighbor.battery_level.map_or(1.0, |b| b.clamp(0.0, 1.0))
}

/// Model artifact as written by the training job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RlModel {
    pub version: u32,
    #[serde(default)]
    pub trained_at: String,
    #[serde(default)]
    pub feature_order: Vec<String>,
    /// Weights keyed by numeric priority ("0", "1", "2")
    #[serde(default)]
    pub priority_weights: HashMap<String, Vec<f64>>,
    /// Minimum battery level keyed by numeric priority
    #[serde(default)]
    pub min_energy_by_priority: HashMap<String, f64>,
    #[serde(default)]
    pub notes: String,
}

impl RlModel {
    /// Read and validate a model file
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| ModelError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let model = Self::from_json(&data)?;
        info!(
            version = model.version,
            trained_at = %model.trained_at,
            features = model.feature_order.len(),
            "Loaded routing model"
        );
        Ok(model)
    }

    /// Parse and validate a model from JSON text
    pub fn from_json(data: &str) -> ModelResult<Self> {
        let model: RlModel =
            serde_json::from_str(data).map_err(|e| ModelError::Parse(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    /// Check the model is usable for every priority
    pub fn validate(&self) -> ModelResult<()> {
        if self.feature_order.is_empty() {
            return Err(ModelError::MissingFeatureOrder);
        }
        self.features()?;

        for priority in Priority::ALL {
            let key = priority.as_u8().to_string();
            let weights = self
                .priority_weights
                .get(&key)
                .ok_or(ModelError::MissingPriorityWeights(priority.as_u8()))?;
            if weights.len() != self.feature_order.len() {
                return Err(ModelError::WeightLengthMismatch {
                    priority: key,
                    expected: self.feature_order.len(),
                    actual: weights.len(),
                });
            }
        }

        for (priority, weights) in &self.priority_weights {
            if weights.len() != self.feature_order.len() {
                return Err(ModelError::WeightLengthMismatch {
                    priority: priority.clone(),
                    expected: self.feature_order.len(),
                    actual: weights.len(),
                });
            }
        }

        for (priority, &value) in &self.min_energy_by_priority {
            if !(0.0..=1.0).contains(&value) {
                return Err(ModelError::InvalidThreshold {
                    priority: priority.clone(),
                    value,
                });
            }
        }

        Ok(())
    }

    /// Parsed feature order
    pub fn features(&self) -> ModelResult<Vec<Feature>> {
        self.feature_order.iter().map(|f| f.parse()).collect()
    }

    /// Energy thresholds, falling back to defaults for priorities the model omits
    pub fn energy_thresholds(&self) -> EnergyThresholds {
        let mut thresholds = EnergyThresholds::default();
        for priority in Priority::ALL {
            if let Some(&value) = self
                .min_energy_by_priority
                .get(&priority.as_u8().to_string())
            {
                thresholds.set(priority, value);
            }
        }
        thresholds
    }
}

/// Router driven by a learned linear model
#[derive(Debug, Clone)]
pub struct LearnedRouter {
    features: Vec<Feature>,
    /// Indexed by `Priority::as_u8`
    weights: [Vec<f64>; 3],
    thresholds: EnergyThresholds,
    version: u32,
}

impl LearnedRouter {
    /// Build from a validated model
    pub fn new(model: RlModel) -> ModelResult<Self> {
        model.validate()?;
        let features = model.features()?;
        let thresholds = model.energy_thresholds();
        let mut weights: [Vec<f64>; 3] = Default::default();
        for priority in Priority::ALL {
            let key = priority.as_u8().to_string();
            weights[priority.as_u8() as usize] = model
                .priority_weights
                .get(&key)
                .cloned()
                .ok_or(ModelError::MissingPriorityWeights(priority.as_u8()))?;
        }

        debug!(version = model.version, "Built learned router");
        Ok(Self {
            features,
            weights,
            thresholds,
            version: model.version,
        })
    }

    /// Load a model file and build a router from it
    pub fn from_path(path: impl AsRef<Path>) -> ModelResult<Self> {
        Self::new(RlModel::load(path)?)
    }

    /// Model version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Energy thresholds in effect
    pub fn thresholds(&self) -> &EnergyThresholds {
        &self.thresholds
    }

    /// Dot product of the priority's weights with the neighbor's features
    pub fn score(&self, neighbor: &Neighbor, bundle: &Bundle, snapshot: &NeighborSnapshot) -> f64 {
        let weights = &self.weights[bundle.priority.as_u8() as usize];
        self.features
            .iter()
            .zip(weights)
            .map(|(feature, w)| w * feature.extract(neighbor, bundle, snapshot))
            .sum()
    }
}

impl RoutingPolicy for LearnedRouter {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn select_next_hop(
        &self,
        bundle: &Bundle,
        neighbors: &NeighborSnapshot,
    ) -> Result<NeighborId, RoutingError> {
        let scored = neighbors
            .active()
            .filter(|neighbor| self.thresholds.is_eligible(neighbor, bundle.priority))
            .map(|neighbor| {
                let score = self.score(neighbor, bundle, neighbors);
                trace!(neighbor = %neighbor.id, score, "Learned score");
                Scored { neighbor, score }
            });

        best(scored).ok_or(RoutingError::NoRouteAvailable)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;

    const MODEL: &str = r#"{
        "version": 1,
        "trained_at": "2025-01-01T00:00:00Z",
        "feature_order": ["link_quality", "latency_score", "bandwidth", "contact_active", "path_match", "energy_score"],
        "priority_weights": {
            "0": [0.2, 0.1, 0.4, 0.1, 0.1, 0.1],
            "1": [0.3, 0.25, 0.2, 0.1, 0.1, 0.05],
            "2": [0.25, 0.4, 0.1, 0.1, 0.1, 0.05]
        },
        "min_energy_by_priority": {"0": 0.3, "1": 0.2, "2": 0.1},
        "notes": "test"
    }"#;

    fn bundle(priority: Priority) -> Bundle {
        Bundle::new(
            "dtn://earth",
            "dtn://mars/rover",
            vec![],
            priority,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_load_model() {
        let model = RlModel::from_json(MODEL).unwrap();
        assert_eq!(model.features().unwrap(), Feature::ALL.to_vec());
        assert_eq!(model.energy_thresholds(), EnergyThresholds::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, MODEL).unwrap();
        assert_eq!(LearnedRouter::from_path(&path).unwrap().version(), 1);

        assert!(matches!(
            RlModel::load(dir.path().join("missing.json")),
            Err(ModelError::Read { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_models() {
        let no_order = MODEL.replace(
            r#"["link_quality", "latency_score", "bandwidth", "contact_active", "path_match", "energy_score"]"#,
            "[]",
        );
        assert!(matches!(
            RlModel::from_json(&no_order),
            Err(ModelError::MissingFeatureOrder)
        ));

        let unknown = MODEL.replace("\"energy_score\"]", "\"snr\"]");
        assert!(matches!(
            RlModel::from_json(&unknown),
            Err(ModelError::UnknownFeature(f)) if f == "snr"
        ));

        let short = MODEL.replace("[0.2, 0.1, 0.4, 0.1, 0.1, 0.1]", "[0.2, 0.1]");
        assert!(matches!(
            RlModel::from_json(&short),
            Err(ModelError::WeightLengthMismatch { actual: 2, .. })
        ));

        let missing = MODEL.replace("\"2\": [0.25, 0.4, 0.1, 0.1, 0.1, 0.05]", "\"9\": [0.25, 0.4, 0.1, 0.1, 0.1, 0.05]");
        assert!(matches!(
            RlModel::from_json(&missing),
            Err(ModelError::MissingPriorityWeights(2))
        ));

        assert!(matches!(
            RlModel::from_json("not json"),
            Err(ModelError::Parse(_))
        ));
    }

    #[test]
    fn test_energy_gate_applies() {
        let router = LearnedRouter::new(RlModel::from_json(MODEL).unwrap()).unwrap();
        let neighbors = NeighborSnapshot::new(
            vec![
                Neighbor::new("low", "dtn://mars").with_battery(0.15),
                Neighbor::new("high", "dtn://mars")
                    .with_link_quality(0.5)
                    .with_battery(0.9),
            ],
            Utc::now(),
        );

        assert_eq!(
            router.select_next_hop(&bundle(Priority::Bulk), &neighbors),
            Ok(NeighborId::new("high"))
        );
        // Expedited tolerates 0.15, and "low" has the better link
        assert_eq!(
            router.select_next_hop(&bundle(Priority::Expedited), &neighbors),
            Ok(NeighborId::new("low"))
        );
    }

    #[test]
    fn test_priority_selects_weights() {
        let router = LearnedRouter::new(RlModel::from_json(MODEL).unwrap()).unwrap();
        // Fat but slow link against a thin, fast one
        let neighbors = NeighborSnapshot::new(
            vec![
                Neighbor::new("fat", "dtn://relay-a")
                    .with_bandwidth(1_000_000)
                    .with_latency(Duration::from_secs(10)),
                Neighbor::new("fast", "dtn://relay-b")
                    .with_bandwidth(0)
                    .with_latency(Duration::ZERO),
            ],
            Utc::now(),
        );

        // Bulk weights bandwidth 0.4 over latency 0.1
        assert_eq!(
            router.select_next_hop(&bundle(Priority::Bulk), &neighbors),
            Ok(NeighborId::new("fat"))
        );
        // Expedited weights latency 0.4 over bandwidth 0.1
        assert_eq!(
            router.select_next_hop(&bundle(Priority::Expedited), &neighbors),
            Ok(NeighborId::new("fast"))
        );
    }

    #[test]
    fn test_feature_order_is_respected() {
        let reordered = r#"{
            "version": 2,
            "feature_order": ["path_match", "link_quality"],
            "priority_weights": {"0": [1.0, 0.0], "1": [1.0, 0.0], "2": [1.0, 0.0]}
        }"#;
        let router = LearnedRouter::new(RlModel::from_json(reordered).unwrap()).unwrap();
        let neighbors = NeighborSnapshot::new(
            vec![
                Neighbor::new("a", "dtn://venus").with_link_quality(1.0),
                Neighbor::new("b", "dtn://mars").with_link_quality(0.1),
            ],
            Utc::now(),
        );

        assert_eq!(
            router.select_next_hop(&bundle(Priority::Normal), &neighbors),
            Ok(NeighborId::new("b"))
        );
    }
}
