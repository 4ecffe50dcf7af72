//! Configuration for the DTN node

use std::time::Duration;

use satnet_core::{BundleLimits, Eid, NeighborId};
use satnet_storage::DEFAULT_CAPACITY;

/// Configuration for a [`DtnNode`](crate::DtnNode)
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Transport-level identity of this node
    pub node_id: NeighborId,
    /// Endpoint this node delivers locally
    pub local_eid: Eid,
    /// Capacity of the store built by [`DtnNode::with_memory_store`](crate::DtnNode::with_memory_store)
    pub store_capacity: usize,
    /// Limits applied on ingress and before every forward
    pub limits: BundleLimits,
    /// Timeout for a single transport send
    pub send_timeout: Duration,
    /// Period of the timer-driven egress cycle
    pub egress_interval: Duration,
    /// Period of the expiry purge
    pub purge_interval: Duration,
    /// A neighbor not heard from for this long is marked inactive
    pub liveness_timeout: Duration,
    /// Period of the liveness sweep
    pub liveness_sweep_interval: Duration,
    /// How long delivered and failed records are kept; `None` keeps them
    pub terminal_retention: Option<Duration>,
    /// Capacity of the local delivery broadcast channel
    pub delivery_channel_capacity: usize,
}

impl NodeConfig {
    /// Create a configuration with default timings
    pub fn new(node_id: impl Into<NeighborId>, local_eid: impl Into<Eid>) -> Self {
        Self {
            node_id: node_id.into(),
            local_eid: local_eid.into(),
            store_capacity: DEFAULT_CAPACITY,
            limits: BundleLimits::default(),
            send_timeout: Duration::from_secs(30),
            egress_interval: Duration::from_secs(5),
            purge_interval: Duration::from_secs(60),
            liveness_timeout: Duration::from_secs(120),
            liveness_sweep_interval: Duration::from_secs(10),
            terminal_retention: Some(Duration::from_secs(3600)),
            delivery_channel_capacity: 1024,
        }
    }

    /// Long-haul links: generous send timeout, slow liveness decay
    pub fn deep_space(node_id: impl Into<NeighborId>, local_eid: impl Into<Eid>) -> Self {
        Self {
            send_timeout: Duration::from_secs(300),
            egress_interval: Duration::from_secs(30),
            liveness_timeout: Duration::from_secs(3600),
            liveness_sweep_interval: Duration::from_secs(60),
            terminal_retention: Some(Duration::from_secs(24 * 3600)),
            ..Self::new(node_id, local_eid)
        }
    }

    /// Short timers for tests
    pub fn testing(node_id: impl Into<NeighborId>, local_eid: impl Into<Eid>) -> Self {
        Self {
            store_capacity: 100,
            send_timeout: Duration::from_millis(500),
            egress_interval: Duration::from_millis(50),
            purge_interval: Duration::from_millis(100),
            liveness_timeout: Duration::from_secs(2),
            liveness_sweep_interval: Duration::from_millis(100),
            terminal_retention: None,
            delivery_channel_capacity: 64,
            ..Self::new(node_id, local_eid)
        }
    }

    /// Set the store capacity
    pub fn with_store_capacity(mut self, capacity: usize) -> Self {
        self.store_capacity = capacity;
        self
    }

    /// Set the bundle limits
    pub fn with_limits(mut self, limits: BundleLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the send timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the egress interval
    pub fn with_egress_interval(mut self, interval: Duration) -> Self {
        self.egress_interval = interval;
        self
    }

    /// Set the expiry purge interval
    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    /// Set the liveness timeout
    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    /// Set the liveness sweep interval
    pub fn with_liveness_sweep_interval(mut self, interval: Duration) -> Self {
        self.liveness_sweep_interval = interval;
        self
    }

    /// Set the terminal record retention
    pub fn with_terminal_retention(mut self, retention: Option<Duration>) -> Self {
        self.terminal_retention = retention;
        self
    }

    /// Set the delivery channel capacity
    pub fn with_delivery_channel_capacity(mut self, capacity: usize) -> Self {
        self.delivery_channel_capacity = capacity;
        self
    }

    /// Reject settings the workers cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.local_eid.is_empty() {
            return Err("local EID must not be empty".to_string());
        }
        if self.node_id.as_str().is_empty() {
            return Err("node ID must not be empty".to_string());
        }
        for (name, value) in [
            ("send_timeout", self.send_timeout),
            ("egress_interval", self.egress_interval),
            ("purge_interval", self.purge_interval),
            ("liveness_timeout", self.liveness_timeout),
            ("liveness_sweep_interval", self.liveness_sweep_interval),
        ] {
            if value.is_zero() {
                return Err(format!("{name} must be greater than zero"));
            }
        }
        if self.delivery_channel_capacity == 0 {
            return Err("delivery_channel_capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}
