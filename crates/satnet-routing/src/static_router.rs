//! Static routing table
//!
//! Fixed destination-prefix to neighbor mapping, longest prefix first.

use satnet_core::{Bundle, Eid, NeighborId, NeighborSnapshot, RoutingError};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::RoutingPolicy;

/// One entry of the static table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    /// Destination EID prefix
    pub prefix: Eid,
    /// Neighbor to forward matching bundles to
    pub next_hop: NeighborId,
}

/// Router backed by a fixed prefix table
///
/// A route is usable only when its neighbor is present in the snapshot with
/// an open contact. When the longest matching route is unusable, shorter
/// matches are tried in turn.
#[derive(Debug, Clone, Default)]
pub struct StaticRouter {
    /// Sorted by prefix length, longest first
    routes: Vec<StaticRoute>,
    fallback_to_any_active: bool,
}

impl StaticRouter {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of routes
    pub fn from_routes(routes: impl IntoIterator<Item = StaticRoute>) -> Self {
        let mut router = Self::new();
        for route in routes {
            router.insert(route);
        }
        router
    }

    /// Add a route
    pub fn with_route(mut self, prefix: impl Into<Eid>, next_hop: impl Into<NeighborId>) -> Self {
        self.insert(StaticRoute {
            prefix: prefix.into(),
            next_hop: next_hop.into(),
        });
        self
    }

    /// Forward to any active neighbor when no route matches
    pub fn with_fallback_to_any_active(mut self, enabled: bool) -> Self {
        self.fallback_to_any_active = enabled;
        self
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn insert(&mut self, route: StaticRoute) {
        self.routes.retain(|r| r.prefix != route.prefix);
        let at = self
            .routes
            .partition_point(|r| r.prefix.as_str().len() >= route.prefix.as_str().len());
        self.routes.insert(at, route);
    }
}

impl RoutingPolicy for StaticRouter {
    fn name(&self) -> &'static str {
        "static"
    }

    fn select_next_hop(
        &self,
        bundle: &Bundle,
        neighbors: &NeighborSnapshot,
    ) -> Result<NeighborId, RoutingError> {
        let now = neighbors.taken_at();

        for route in &self.routes {
            if !route.prefix.is_prefix_of(&bundle.destination) {
                continue;
            }
            match neighbors.get(&route.next_hop) {
                Some(neighbor) if neighbor.in_contact(now) => return Ok(route.next_hop.clone()),
                _ => trace!(prefix = %route.prefix, next_hop = %route.next_hop, "Static route unusable"),
            }
        }

        if self.fallback_to_any_active {
            if let Some(neighbor) = neighbors.active().next() {
                return Ok(neighbor.id.clone());
            }
        }

        Err(RoutingError::NoRouteAvailable)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use satnet_core::{Neighbor, Priority};

    use super::*;

    fn bundle_to(dest: &str) -> Bundle {
        Bundle::new(
            "dtn://earth",
            dest,
            vec![],
            Priority::Normal,
            Duration::from_secs(60),
        )
    }

    fn snapshot(neighbors: Vec<Neighbor>) -> NeighborSnapshot {
        NeighborSnapshot::new(neighbors, Utc::now())
    }

    #[test]
    fn test_longest_prefix_wins() {
        let router = StaticRouter::new()
            .with_route("dtn://mars", "relay-1")
            .with_route("dtn://mars/rover", "relay-2");
        let neighbors = snapshot(vec![
            Neighbor::new("relay-1", "dtn://relay-1"),
            Neighbor::new("relay-2", "dtn://relay-2"),
        ]);

        assert_eq!(
            router.select_next_hop(&bundle_to("dtn://mars/rover/cam"), &neighbors),
            Ok(NeighborId::new("relay-2"))
        );
        assert_eq!(
            router.select_next_hop(&bundle_to("dtn://mars/base"), &neighbors),
            Ok(NeighborId::new("relay-1"))
        );
    }

    #[test]
    fn test_inactive_route_falls_through_to_shorter_prefix() {
        let router = StaticRouter::new()
            .with_route("dtn://mars", "relay-1")
            .with_route("dtn://mars/rover", "relay-2");
        let neighbors = snapshot(vec![
            Neighbor::new("relay-1", "dtn://relay-1"),
            Neighbor::new("relay-2", "dtn://relay-2").with_contact_active(false),
        ]);

        assert_eq!(
            router.select_next_hop(&bundle_to("dtn://mars/rover"), &neighbors),
            Ok(NeighborId::new("relay-1"))
        );
    }

    #[test]
    fn test_no_match_is_no_route() {
        let router = StaticRouter::new().with_route("dtn://mars", "relay-1");
        let neighbors = snapshot(vec![Neighbor::new("relay-1", "dtn://relay-1")]);

        assert_eq!(
            router.select_next_hop(&bundle_to("dtn://earth/jpl"), &neighbors),
            Err(RoutingError::NoRouteAvailable)
        );
    }

    #[test]
    fn test_fallback_to_any_active() {
        let router = StaticRouter::new().with_fallback_to_any_active(true);
        let neighbors = snapshot(vec![
            Neighbor::new("a", "dtn://a").with_contact_active(false),
            Neighbor::new("b", "dtn://b"),
        ]);

        assert_eq!(
            router.select_next_hop(&bundle_to("dtn://earth/jpl"), &neighbors),
            Ok(NeighborId::new("b"))
        );
    }

    #[test]
    fn test_replacing_a_route() {
        let router = StaticRouter::new()
            .with_route("dtn://mars", "relay-1")
            .with_route("dtn://mars", "relay-2");
        assert_eq!(router.len(), 1);
    }
}
