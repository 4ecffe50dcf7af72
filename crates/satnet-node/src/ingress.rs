//! Ingress worker
//!
//! Decodes bytes arriving from the transport, validates them, stores the
//! bundle and either delivers it locally or leaves it for egress.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use satnet_core::{Bundle, BundleError, CodecError, NeighborId, TransportError, decode, validate};
use satnet_storage::{BundleStatus, PutOutcome, StoreError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::NodeInner;
use crate::stats::NodeStats;

/// Pause after a transport receive error before trying again
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// What happened to one received buffer
#[derive(Debug, Clone, PartialEq)]
pub enum IngressOutcome {
    /// Stored for forwarding
    Stored,
    /// Already in the store; nothing changed
    Duplicate,
    /// Addressed to this node and handed to local subscribers
    DeliveredLocally,
    /// Bytes did not decode; dropped
    Malformed(CodecError),
    /// Bundle failed validation; dropped
    Rejected(BundleError),
    /// No room could be made; dropped
    StoreFull,
    /// The store failed; dropped
    Failed(String),
}

impl IngressOutcome {
    /// Whether the bundle is now held by the store awaiting egress
    pub fn awaits_egress(&self) -> bool {
        matches!(self, IngressOutcome::Stored)
    }
}

/// Result of admitting a decoded, valid bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admitted {
    Stored,
    Duplicate,
    DeliveredLocally,
}

impl NodeInner {
    /// Process one buffer received from `from`
    pub(crate) async fn ingest(&self, from: &NeighborId, data: &[u8]) -> IngressOutcome {
        let now = Utc::now();
        NodeStats::bump(&self.stats.received);
        self.neighbors.touch(from, now);

        let bundle = match decode(data) {
            Ok(bundle) => bundle,
            Err(e) => {
                NodeStats::bump(&self.stats.dropped_malformed);
                warn!(neighbor = %from, len = data.len(), reason = %e, "Dropping malformed bundle");
                return IngressOutcome::Malformed(e);
            }
        };

        if let Err(e) = validate(&bundle, now, &self.config.limits) {
            NodeStats::bump(&self.stats.rejected_invalid);
            warn!(bundle_id = %bundle.id, neighbor = %from, reason = %e, "Rejecting invalid bundle");
            return IngressOutcome::Rejected(e);
        }

        match self.admit(bundle, now).await {
            Ok(Admitted::Stored) => IngressOutcome::Stored,
            Ok(Admitted::Duplicate) => IngressOutcome::Duplicate,
            Ok(Admitted::DeliveredLocally) => IngressOutcome::DeliveredLocally,
            Err(StoreError::StoreFull { capacity }) => {
                NodeStats::bump(&self.stats.store_full_drops);
                warn!(neighbor = %from, capacity, "Store full, dropping bundle");
                IngressOutcome::StoreFull
            }
            Err(StoreError::AlreadyExpired(id)) => {
                NodeStats::bump(&self.stats.rejected_invalid);
                debug!(bundle_id = %id, "Bundle expired before it was stored");
                IngressOutcome::Rejected(BundleError::Expired)
            }
            Err(e) => {
                warn!(neighbor = %from, error = %e, "Failed to store bundle");
                IngressOutcome::Failed(e.to_string())
            }
        }
    }

    /// Store a valid bundle and deliver it if it is addressed to us
    pub(crate) async fn admit(&self, bundle: Bundle, now: DateTime<Utc>) -> Result<Admitted, StoreError> {
        let id = bundle.id;
        let local = bundle.destination == self.config.local_eid;
        let delivery = if local { Some(bundle.clone()) } else { None };

        match self.store.put(bundle, now).await? {
            PutOutcome::AlreadyStored => {
                NodeStats::bump(&self.stats.duplicates);
                debug!(bundle_id = %id, "Duplicate bundle ignored");
                return Ok(Admitted::Duplicate);
            }
            PutOutcome::StoredAfterEviction { evicted } => {
                info!(bundle_id = %id, evicted = %evicted, "Evicted bundle to make room");
            }
            PutOutcome::Stored => {}
        }

        match delivery {
            Some(bundle) => {
                self.store.update_status(&id, BundleStatus::Delivered).await?;
                NodeStats::bump(&self.stats.delivered_locally);
                info!(bundle_id = %id, source = %bundle.source, size = bundle.size(), "Delivered locally");
                // No subscribers is not an error; the record stays delivered
                let _ = self.deliveries.send(bundle);
                Ok(Admitted::DeliveredLocally)
            }
            None => {
                debug!(bundle_id = %id, "Bundle stored for forwarding");
                Ok(Admitted::Stored)
            }
        }
    }
}

/// Spawn the worker that pulls from the transport
pub(crate) fn spawn(inner: Arc<NodeInner>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Ingress worker stopping");
                    break;
                }
                result = inner.transport.recv() => {
                    match result {
                        Ok((from, data)) => {
                            if inner.ingest(&from, &data).await.awaits_egress() {
                                inner.egress_trigger.notify_one();
                            }
                        }
                        Err(TransportError::ConnectionClosed) => {
                            info!("Transport closed, ingress worker stopping");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Transport receive error");
                            tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }
    })
}
