//! Maintenance workers
//!
//! Timer-driven housekeeping: expiry purge, neighbor liveness and the
//! contact feed pump.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::NodeInner;
use crate::contact_feed::ContactFeed;
use crate::error::NodeResult;
use crate::stats::NodeStats;

impl NodeInner {
    /// Remove expired records, and terminal records past retention
    pub(crate) async fn purge(&self) -> NodeResult<usize> {
        let now = Utc::now();
        let expired = self.store.purge_expired(now).await?;
        if expired > 0 {
            NodeStats::add(&self.stats.expired_purged, expired as u64);
            info!(count = expired, "Purged expired bundles");
        }

        if let Some(retention) = self.config.terminal_retention {
            let cutoff = chrono::Duration::from_std(retention)
                .ok()
                .and_then(|age| now.checked_sub_signed(age));
            if let Some(cutoff) = cutoff {
                let removed = self.store.purge_terminal(cutoff).await?;
                if removed > 0 {
                    debug!(count = removed, "Purged terminal records");
                }
            }
        }

        Ok(expired)
    }

    /// Mark neighbors that have gone quiet as inactive
    pub(crate) fn sweep_liveness(&self) -> usize {
        self.neighbors
            .sweep_liveness(Utc::now(), self.config.liveness_timeout)
            .len()
    }
}

/// Spawn the periodic expiry purge
pub(crate) fn spawn_purge(inner: Arc<NodeInner>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(inner.config.purge_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Purge worker stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = inner.purge().await {
                        warn!(error = %e, "Expiry purge failed");
                    }
                }
            }
        }
    })
}

/// Spawn the periodic liveness sweep
pub(crate) fn spawn_liveness(inner: Arc<NodeInner>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(inner.config.liveness_sweep_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Liveness worker stopping");
                    break;
                }
                _ = interval.tick() => {
                    inner.sweep_liveness();
                }
            }
        }
    })
}

/// Spawn the worker that applies contact feed updates
///
/// An update for a neighbor that is now in contact wakes egress, since
/// bundles may have been waiting for exactly that contact.
pub(crate) fn spawn_contact_feed(
    inner: Arc<NodeInner>,
    mut feed: Box<dyn ContactFeed>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Contact feed worker stopping");
                    break;
                }
                update = feed.next_update() => {
                    let Some(update) = update else {
                        debug!("Contact feed ended");
                        break;
                    };
                    if inner.apply_update(update) {
                        inner.egress_trigger.notify_one();
                    }
                }
            }
        }
    })
}
