//! # Satnet Node
//!
//! Store-and-forward DTN node. A [`DtnNode`] owns a bundle store, a routing
//! policy, a transport and a neighbor table, and runs four background
//! workers once started:
//!
//! - **ingress**: decode, validate, store, deliver locally or queue
//! - **egress**: forward pending bundles in priority order
//! - **purge**: drop expired bundles and old terminal records
//! - **liveness**: mark neighbors that went quiet as inactive
//!
//! A fifth worker pumps the [`ContactFeed`] if one was supplied.
//!
//! ## Example
//!
//! ```rust,ignore
//! use satnet_node::{DtnNode, NodeConfig};
//! use satnet_routing::ContactGraphRouter;
//!
//! let node = DtnNode::with_memory_store(
//!     NodeConfig::new("earth-gs", "dtn://earth/gs"),
//!     Arc::new(ContactGraphRouter::new()),
//!     transport,
//! );
//! node.start().await?;
//! let id = node.submit("dtn://mars/rover", payload, Priority::Expedited, ttl).await?;
//! ```

pub mod config;
pub mod contact_feed;
pub mod egress;
pub mod error;
pub mod ingress;
pub mod maintenance;
pub mod neighbors;
pub mod stats;

pub use config::NodeConfig;
pub use contact_feed::{ChannelContactFeed, ContactFeed, StaticContactFeed};
pub use egress::EgressReport;
pub use error::{NodeError, NodeResult};
pub use ingress::IngressOutcome;
pub use neighbors::NeighborTable;
pub use stats::{CounterSnapshot, NodeStats, StatsSnapshot};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use satnet_core::{
    Bundle, BundleId, Eid, NeighborId, NeighborSnapshot, NeighborUpdate, Priority, Transport,
    validate,
};
use satnet_routing::RoutingPolicy;
use satnet_storage::{BundleStore, InMemoryBundleStore};
use tokio::sync::{Mutex, Notify, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use ingress::Admitted;

/// State shared between the node handle and its workers
pub(crate) struct NodeInner {
    config: NodeConfig,
    store: Arc<dyn BundleStore>,
    router: Arc<dyn RoutingPolicy>,
    transport: Arc<dyn Transport>,
    neighbors: NeighborTable,
    stats: NodeStats,
    /// Bundles delivered to this node's EID
    deliveries: broadcast::Sender<Bundle>,
    /// Wakes the egress worker ahead of its timer
    egress_trigger: Notify,
    /// Serializes egress cycles
    egress_lock: Mutex<()>,
}

impl NodeInner {
    /// Apply a contact feed report; returns whether the neighbor is now in contact
    fn apply_update(&self, update: NeighborUpdate) -> bool {
        let now = Utc::now();
        let id = update.neighbor_id.clone();
        if self.neighbors.upsert(update, now) {
            info!(neighbor = %id, "Neighbor discovered");
        }
        self.neighbors
            .get(&id)
            .is_some_and(|neighbor| neighbor.in_contact(now))
    }
}

/// A DTN bundle node
pub struct DtnNode {
    inner: Arc<NodeInner>,
    /// Contact feed, consumed by the first start
    contact_feed: parking_lot::Mutex<Option<Box<dyn ContactFeed>>>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Background task handles
    background_tasks: RwLock<Vec<JoinHandle<()>>>,
    /// Whether the node has been started
    started: AtomicBool,
}

impl DtnNode {
    /// Create a node from its parts
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn BundleStore>,
        router: Arc<dyn RoutingPolicy>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (deliveries, _) = broadcast::channel(config.delivery_channel_capacity.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            node = %config.node_id,
            eid = %config.local_eid,
            router = router.name(),
            "Node created"
        );

        Self {
            inner: Arc::new(NodeInner {
                config,
                store,
                router,
                transport,
                neighbors: NeighborTable::new(),
                stats: NodeStats::default(),
                deliveries,
                egress_trigger: Notify::new(),
                egress_lock: Mutex::new(()),
            }),
            contact_feed: parking_lot::Mutex::new(None),
            shutdown_tx,
            background_tasks: RwLock::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Create a node backed by an in-memory store of `config.store_capacity`
    pub fn with_memory_store(
        config: NodeConfig,
        router: Arc<dyn RoutingPolicy>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let store = Arc::new(InMemoryBundleStore::new(config.store_capacity));
        Self::new(config, store, router, transport)
    }

    /// Attach a contact feed, pumped once the node starts
    pub fn with_contact_feed(self, feed: Box<dyn ContactFeed>) -> Self {
        *self.contact_feed.lock() = Some(feed);
        self
    }

    /// Start the background workers
    #[instrument(skip(self), fields(node = %self.inner.config.node_id))]
    pub async fn start(&self) -> NodeResult<()> {
        self.inner.config.validate().map_err(NodeError::Config)?;

        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStarted);
        }

        let mut tasks = vec![
            ingress::spawn(self.inner.clone(), self.shutdown_tx.subscribe()),
            egress::spawn(self.inner.clone(), self.shutdown_tx.subscribe()),
            maintenance::spawn_purge(self.inner.clone(), self.shutdown_tx.subscribe()),
            maintenance::spawn_liveness(self.inner.clone(), self.shutdown_tx.subscribe()),
        ];

        if let Some(feed) = self.contact_feed.lock().take() {
            tasks.push(maintenance::spawn_contact_feed(
                self.inner.clone(),
                feed,
                self.shutdown_tx.subscribe(),
            ));
        }

        self.background_tasks.write().await.extend(tasks);

        info!(router = self.inner.router.name(), "Node started");
        Ok(())
    }

    /// Stop the background workers and wait for them
    ///
    /// An egress cycle in progress runs to completion first.
    #[instrument(skip(self), fields(node = %self.inner.config.node_id))]
    pub async fn stop(&self) -> NodeResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown_tx.send(());

        let mut tasks = self.background_tasks.write().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }

        info!("Node stopped");
        Ok(())
    }

    /// Check if the node is started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Get the configuration
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Get the bundle store
    pub fn store(&self) -> &Arc<dyn BundleStore> {
        &self.inner.store
    }

    /// Create and store a bundle originating at this node
    ///
    /// A bundle addressed to our own EID is delivered immediately; any other
    /// is queued and egress is woken.
    #[instrument(skip(self, destination, payload), fields(size = payload.len()))]
    pub async fn submit(
        &self,
        destination: impl Into<Eid>,
        payload: Vec<u8>,
        priority: Priority,
        lifetime: Duration,
    ) -> NodeResult<BundleId> {
        let bundle = Bundle::new(
            self.inner.config.local_eid.clone(),
            destination,
            payload,
            priority,
            lifetime,
        );
        self.submit_bundle(bundle).await
    }

    /// Store a prebuilt bundle as if it were submitted locally
    pub async fn submit_bundle(&self, bundle: Bundle) -> NodeResult<BundleId> {
        let now = Utc::now();
        validate(&bundle, now, &self.inner.config.limits)?;

        let id = bundle.id;
        let destination = bundle.destination.clone();
        let admitted = self.inner.admit(bundle, now).await?;
        NodeStats::bump(&self.inner.stats.submitted);
        info!(bundle_id = %id, destination = %destination, "Bundle submitted");

        if admitted == Admitted::Stored {
            self.inner.egress_trigger.notify_one();
        }
        Ok(id)
    }

    /// Process bytes as if they had arrived from `from` over the transport
    pub async fn ingest(&self, from: &NeighborId, data: &[u8]) -> IngressOutcome {
        let outcome = self.inner.ingest(from, data).await;
        if outcome.awaits_egress() {
            self.inner.egress_trigger.notify_one();
        }
        outcome
    }

    /// Apply a neighbor report directly, bypassing any contact feed
    pub fn update_neighbor(&self, update: NeighborUpdate) {
        if self.inner.apply_update(update) {
            self.inner.egress_trigger.notify_one();
        }
    }

    /// Snapshot of the neighbor table
    pub fn neighbors(&self) -> NeighborSnapshot {
        self.inner.neighbors.snapshot(Utc::now())
    }

    /// Subscribe to bundles delivered to this node's EID
    pub fn subscribe_deliveries(&self) -> broadcast::Receiver<Bundle> {
        self.inner.deliveries.subscribe()
    }

    /// Store status counts, neighbor counts and counters
    pub async fn stats(&self) -> NodeResult<StatsSnapshot> {
        let counts = self.inner.store.status_counts().await?;
        let now = Utc::now();
        Ok(StatsSnapshot {
            pending: counts.pending,
            in_transit: counts.in_transit,
            delivered: counts.delivered,
            failed: counts.failed,
            neighbor_count: self.inner.neighbors.len(),
            active_neighbor_count: self.inner.neighbors.active_count(now),
            counters: self.inner.stats.counters(),
        })
    }

    /// Run one egress cycle now
    pub async fn run_egress_cycle(&self) -> NodeResult<EgressReport> {
        self.inner.run_egress_cycle().await
    }

    /// Purge expired bundles now; returns how many were removed
    pub async fn purge_expired(&self) -> NodeResult<usize> {
        self.inner.purge().await
    }

    /// Run a liveness sweep now; returns how many neighbors went inactive
    pub fn sweep_liveness(&self) -> usize {
        self.inner.sweep_liveness()
    }
}
