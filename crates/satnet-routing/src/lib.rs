//! # Satnet Routing
//!
//! Next-hop selection for the Satnet DTN node.
//!
//! A [`RoutingPolicy`] is a pure function of a bundle and an immutable
//! [`NeighborSnapshot`]: it either names a neighbor or reports
//! [`RoutingError::NoRouteAvailable`], in which case the bundle stays
//! pending for a later egress cycle.
//!
//! ## Strategies
//!
//! - [`StaticRouter`]: fixed destination-prefix table, longest prefix first
//! - [`ContactGraphRouter`]: weighted link score plus a path bonus
//! - [`EnergyAwareRouter`]: battery gate per priority, then contact-graph scoring
//! - [`LearnedRouter`]: per-priority linear model loaded from a JSON artifact
//!
//! ## Example
//!
//! ```rust,ignore
//! use satnet_routing::{RouterKind, RoutingPolicy};
//!
//! let policy = RouterKind::EnergyAware(Default::default()).build()?;
//! let next_hop = policy.select_next_hop(&bundle, &snapshot)?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use satnet_core::{Bundle, NeighborId, NeighborSnapshot, RoutingError};
use serde::{Deserialize, Serialize};

pub mod contact_graph;
pub mod energy;
pub mod error;
pub mod learned;
pub mod scoring;
pub mod static_router;

pub use contact_graph::{ContactGraphConfig, ContactGraphRouter, DEFAULT_MIN_SCORE};
pub use energy::{EnergyAwareRouter, EnergyThresholds};
pub use error::{ModelError, ModelResult};
pub use learned::{Feature, LearnedRouter, RlModel};
pub use scoring::{REFERENCE_BANDWIDTH, ScoreWeights};
pub use static_router::{StaticRoute, StaticRouter};

/// Chooses the next hop for a bundle
///
/// Implementations must not mutate shared state; the egress worker may call
/// them for many bundles against the same snapshot.
pub trait RoutingPolicy: Send + Sync {
    /// Strategy name, for logs
    fn name(&self) -> &'static str;

    /// Pick a neighbor to forward `bundle` to
    fn select_next_hop(
        &self,
        bundle: &Bundle,
        neighbors: &NeighborSnapshot,
    ) -> Result<NeighborId, RoutingError>;
}

/// Energy-aware router configuration
///
/// `scoring.min_score` defaults to 0.0: the battery thresholds decide which
/// neighbors are eligible and the score only ranks them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyAwareConfig {
    pub scoring: ContactGraphConfig,
    pub thresholds: EnergyThresholds,
}

impl Default for EnergyAwareConfig {
    fn default() -> Self {
        Self {
            scoring: ContactGraphConfig::ranking_only(),
            thresholds: EnergyThresholds::default(),
        }
    }
}

/// Routing strategy selection, as read from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RouterKind {
    Static {
        #[serde(default)]
        routes: Vec<StaticRoute>,
        #[serde(default)]
        fallback_to_any_active: bool,
    },
    ContactGraph(ContactGraphConfig),
    EnergyAware(EnergyAwareConfig),
    Learned { model_path: PathBuf },
}

impl Default for RouterKind {
    fn default() -> Self {
        Self::ContactGraph(ContactGraphConfig::default())
    }
}

impl RouterKind {
    /// Short strategy name
    pub fn name(&self) -> &'static str {
        match self {
            RouterKind::Static { .. } => "static",
            RouterKind::ContactGraph(_) => "contact_graph",
            RouterKind::EnergyAware(_) => "energy_aware",
            RouterKind::Learned { .. } => "learned",
        }
    }

    /// Construct the policy
    ///
    /// Only the learned strategy can fail, when its model cannot be loaded.
    pub fn build(&self) -> ModelResult<Arc<dyn RoutingPolicy>> {
        let policy: Arc<dyn RoutingPolicy> = match self {
            RouterKind::Static {
                routes,
                fallback_to_any_active,
            } => Arc::new(
                StaticRouter::from_routes(routes.iter().cloned())
                    .with_fallback_to_any_active(*fallback_to_any_active),
            ),
            RouterKind::ContactGraph(config) => Arc::new(ContactGraphRouter::with_config(*config)),
            RouterKind::EnergyAware(config) => Arc::new(
                EnergyAwareRouter::new()
                    .with_scoring(config.scoring)
                    .with_thresholds(config.thresholds),
            ),
            RouterKind::Learned { model_path } => Arc::new(LearnedRouter::from_path(model_path)?),
        };
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_kind_from_json() {
        let kind: RouterKind = serde_json::from_str(
            r#"{"strategy": "static", "routes": [{"prefix": "dtn://mars", "next_hop": "relay-1"}]}"#,
        )
        .unwrap();
        let policy = kind.build().unwrap();
        assert_eq!(policy.name(), "static");

        let kind: RouterKind = serde_json::from_str(r#"{"strategy": "energy_aware"}"#).unwrap();
        assert_eq!(kind.build().unwrap().name(), "energy_aware");
    }

    #[test]
    fn test_default_is_contact_graph() {
        let kind = RouterKind::default();
        assert_eq!(kind.name(), "contact_graph");
        assert_eq!(kind.build().unwrap().name(), "contact_graph");
    }

    #[test]
    fn test_learned_with_missing_model_fails() {
        let kind = RouterKind::Learned {
            model_path: PathBuf::from("/nonexistent/model.json"),
        };
        assert!(matches!(kind.build(), Err(ModelError::Read { .. })));
    }
}
