//! Contact feeds
//!
//! A [`ContactFeed`] reports neighbor state to the node: link estimates,
//! battery level and contact windows. Orbital prediction lives outside the
//! node; these feeds only carry its output.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use satnet_core::NeighborUpdate;
use tokio::sync::mpsc;

/// Source of neighbor updates
#[async_trait]
pub trait ContactFeed: Send {
    /// Wait for the next update; `None` when the feed has ended
    async fn next_update(&mut self) -> Option<NeighborUpdate>;
}

/// Feed driven through an mpsc channel
pub struct ChannelContactFeed {
    rx: mpsc::Receiver<NeighborUpdate>,
}

impl ChannelContactFeed {
    /// Create a feed and the sender that drives it
    pub fn channel(capacity: usize) -> (mpsc::Sender<NeighborUpdate>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl ContactFeed for ChannelContactFeed {
    async fn next_update(&mut self) -> Option<NeighborUpdate> {
        self.rx.recv().await
    }
}

/// Feed that replays a fixed neighbor list
///
/// With a refresh interval, the list is re-announced periodically so that
/// statically configured neighbors do not age out in the liveness sweep.
pub struct StaticContactFeed {
    updates: Vec<NeighborUpdate>,
    queue: VecDeque<NeighborUpdate>,
    refresh: Option<Duration>,
}

impl StaticContactFeed {
    /// Announce `updates` once
    pub fn new(updates: Vec<NeighborUpdate>) -> Self {
        Self {
            queue: updates.iter().cloned().collect(),
            updates,
            refresh: None,
        }
    }

    /// Re-announce every `interval`
    pub fn with_refresh(mut self, interval: Duration) -> Self {
        self.refresh = Some(interval);
        self
    }
}

#[async_trait]
impl ContactFeed for StaticContactFeed {
    async fn next_update(&mut self) -> Option<NeighborUpdate> {
        if let Some(update) = self.queue.pop_front() {
            return Some(update);
        }
        let interval = self.refresh?;
        if self.updates.is_empty() {
            return None;
        }
        tokio::time::sleep(interval).await;
        self.queue.extend(self.updates.iter().cloned());
        self.queue.pop_front()
    }
}
