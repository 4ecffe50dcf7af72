//! Egress worker
//!
//! One cycle takes a single neighbor snapshot, walks the pending bundles in
//! priority order and asks the routing policy for a next hop for each.
//! Cycles are serialized so a bundle is never in flight twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use satnet_core::{
    BundleError, BundleId, NeighborId, NeighborSnapshot, RoutingError, encode, validate,
};
use satnet_storage::{BundleFilter, BundleStatus, StoredBundleRecord};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::NodeInner;
use crate::error::NodeResult;
use crate::stats::NodeStats;

/// Summary of one egress cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EgressReport {
    /// Bundles handed to the transport, with their next hop
    pub forwarded: Vec<(BundleId, NeighborId)>,
    /// Bundles left pending for lack of a route
    pub no_route: Vec<BundleId>,
    /// Bundles left pending after a failed or timed-out send
    pub send_failures: Vec<BundleId>,
    /// Bundles marked failed (hop limit, invalid, unencodable)
    pub failed: Vec<BundleId>,
    /// Expired bundles removed
    pub expired: Vec<BundleId>,
}

impl EgressReport {
    /// Number of bundles considered
    pub fn considered(&self) -> usize {
        self.forwarded.len()
            + self.no_route.len()
            + self.send_failures.len()
            + self.failed.len()
            + self.expired.len()
    }
}

enum Disposition {
    Forwarded(NeighborId),
    NoRoute,
    SendFailed,
    Failed,
    Expired,
}

/// Pending bundles in forwarding order: Expedited first, then oldest first
pub(crate) fn forwarding_order(records: &mut [StoredBundleRecord]) {
    records.sort_by(|a, b| {
        b.bundle
            .priority
            .cmp(&a.bundle.priority)
            .then_with(|| a.stored_at.cmp(&b.stored_at))
            .then_with(|| a.sequence.cmp(&b.sequence))
    });
}

impl NodeInner {
    /// Run one egress cycle
    #[instrument(skip(self), fields(node = %self.config.node_id, router = self.router.name()))]
    pub(crate) async fn run_egress_cycle(&self) -> NodeResult<EgressReport> {
        let _cycle = self.egress_lock.lock().await;
        NodeStats::bump(&self.stats.egress_cycles);

        let now = Utc::now();
        let snapshot = self.neighbors.snapshot(now);
        let mut pending = self.store.list(&BundleFilter::pending()).await?;
        forwarding_order(&mut pending);

        let mut report = EgressReport::default();
        for record in pending {
            let id = record.id();
            match self.forward_one(record, &snapshot, now).await {
                Disposition::Forwarded(hop) => report.forwarded.push((id, hop)),
                Disposition::NoRoute => report.no_route.push(id),
                Disposition::SendFailed => report.send_failures.push(id),
                Disposition::Failed => report.failed.push(id),
                Disposition::Expired => report.expired.push(id),
            }
        }

        if report.considered() > 0 {
            debug!(
                forwarded = report.forwarded.len(),
                no_route = report.no_route.len(),
                send_failures = report.send_failures.len(),
                failed = report.failed.len(),
                expired = report.expired.len(),
                "Egress cycle complete"
            );
        }
        Ok(report)
    }

    async fn forward_one(
        &self,
        record: StoredBundleRecord,
        snapshot: &NeighborSnapshot,
        now: DateTime<Utc>,
    ) -> Disposition {
        let bundle = record.bundle;
        let id = bundle.id;

        match validate(&bundle, now, &self.config.limits) {
            Ok(()) => {}
            Err(BundleError::Expired) => {
                if let Err(e) = self.store.delete(&id).await {
                    warn!(bundle_id = %id, error = %e, "Failed to remove expired bundle");
                }
                NodeStats::bump(&self.stats.expired_purged);
                debug!(bundle_id = %id, "Expired before forwarding");
                return Disposition::Expired;
            }
            Err(e) => {
                warn!(bundle_id = %id, reason = %e, "Bundle no longer valid, marking failed");
                self.set_status(&id, BundleStatus::Failed).await;
                return Disposition::Failed;
            }
        }

        if !bundle.can_forward(self.config.limits.max_hop_count) {
            NodeStats::bump(&self.stats.hop_limit_failures);
            warn!(bundle_id = %id, hop_count = bundle.hop_count, "Hop limit reached, marking failed");
            self.set_status(&id, BundleStatus::Failed).await;
            return Disposition::Failed;
        }

        let hop = match self.router.select_next_hop(&bundle, snapshot) {
            Ok(hop) => hop,
            Err(RoutingError::NoRouteAvailable) => {
                trace!(bundle_id = %id, destination = %bundle.destination, "No route, staying pending");
                return Disposition::NoRoute;
            }
        };

        let bytes = match bundle
            .forwarded(&self.config.local_eid)
            .map_err(|e| e.to_string())
            .and_then(|copy| encode(&copy).map_err(|e| e.to_string()))
        {
            Ok(bytes) => bytes,
            Err(reason) => {
                warn!(bundle_id = %id, reason = %reason, "Cannot encode bundle, marking failed");
                self.set_status(&id, BundleStatus::Failed).await;
                return Disposition::Failed;
            }
        };

        let sent = tokio::time::timeout(
            self.config.send_timeout,
            self.transport.send(&hop, bytes.to_vec()),
        )
        .await;

        match sent {
            Ok(Ok(())) => {
                // A successful send is the transport's acknowledgment
                self.set_status(&id, BundleStatus::InTransit).await;
                self.set_status(&id, BundleStatus::Delivered).await;
                NodeStats::bump(&self.stats.forwarded);
                info!(
                    bundle_id = %id,
                    neighbor = %hop,
                    priority = %bundle.priority,
                    hop_count = bundle.hop_count + 1,
                    "Bundle forwarded"
                );
                Disposition::Forwarded(hop)
            }
            Ok(Err(e)) => {
                NodeStats::bump(&self.stats.send_failures);
                warn!(bundle_id = %id, neighbor = %hop, reason = %e, "Send failed, will retry");
                Disposition::SendFailed
            }
            Err(_) => {
                NodeStats::bump(&self.stats.send_failures);
                warn!(
                    bundle_id = %id,
                    neighbor = %hop,
                    timeout_ms = self.config.send_timeout.as_millis() as u64,
                    "Send timed out, will retry"
                );
                Disposition::SendFailed
            }
        }
    }

    async fn set_status(&self, id: &BundleId, status: BundleStatus) {
        if let Err(e) = self.store.update_status(id, status).await {
            warn!(bundle_id = %id, status = %status, error = %e, "Status update failed");
        }
    }
}

/// Spawn the worker that runs egress cycles on trigger or timer
pub(crate) fn spawn(inner: Arc<NodeInner>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(inner.config.egress_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Egress worker stopping");
                    break;
                }
                _ = interval.tick() => {}
                _ = inner.egress_trigger.notified() => {}
            }

            if let Err(e) = inner.run_egress_cycle().await {
                warn!(error = %e, "Egress cycle failed");
            }
        }
    })
}
