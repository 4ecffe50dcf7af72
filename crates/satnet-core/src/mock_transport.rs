//! Mock transport implementation for testing
//!
//! Provides an in-memory transport so the node's ingress and egress paths
//! can be exercised without sockets.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use satnet_core::{MockTransportBuilder, NeighborId, Transport};
//!
//! let earth = NeighborId::new("earth-gw");
//! let relay = NeighborId::new("relay-1");
//! let (t_earth, t_relay) = MockTransportBuilder::new().create_connected_pair(earth.clone(), relay.clone());
//!
//! t_earth.send(&relay, bundle_bytes).await?;
//! let (from, data) = t_relay.recv().await?;
//! assert_eq!(from, earth);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{RwLock, mpsc};
use tracing::trace;

use crate::error::TransportError;
use crate::neighbor::NeighborId;
use crate::transport::Transport;

/// Message in the mock transport
#[derive(Debug, Clone)]
pub struct MockMessage {
    /// The sender of the message
    pub sender: NeighborId,
    /// The message payload
    pub data: Vec<u8>,
}

/// A mock transport for testing
///
/// Messages are delivered via in-memory channels. Every successful send is
/// also recorded so tests can assert on what left the node.
pub struct MockTransport {
    /// Our identity
    local_id: NeighborId,
    /// Outgoing channels to peers (peer -> sender channel)
    outgoing: DashMap<NeighborId, mpsc::Sender<MockMessage>>,
    /// Incoming message channel receiver
    inbox_rx: Arc<RwLock<mpsc::Receiver<MockMessage>>>,
    /// Incoming message channel sender (for peers to send to us)
    inbox_tx: mpsc::Sender<MockMessage>,
    /// Peers whose sends fail regardless of connectivity
    failing: Mutex<HashSet<NeighborId>>,
    /// Time every send waits before delivering
    send_delay: Mutex<Duration>,
    /// Log of successful sends
    sent: Mutex<Vec<(NeighborId, Vec<u8>)>>,
}

impl MockTransport {
    /// Create a new mock transport with the given identity
    pub fn new(local_id: impl Into<NeighborId>) -> Self {
        Self::with_buffer_size(local_id, 1024)
    }

    /// Create a new mock transport with a specific buffer size
    pub fn with_buffer_size(local_id: impl Into<NeighborId>, buffer_size: usize) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(buffer_size);
        Self {
            local_id: local_id.into(),
            outgoing: DashMap::new(),
            inbox_rx: Arc::new(RwLock::new(inbox_rx)),
            inbox_tx,
            failing: Mutex::new(HashSet::new()),
            send_delay: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Get our local identity
    pub fn local_id(&self) -> &NeighborId {
        &self.local_id
    }

    /// Get the inbox sender for this transport
    ///
    /// Tests can also use it to inject raw bytes "from" any neighbor.
    pub fn inbox_sender(&self) -> mpsc::Sender<MockMessage> {
        self.inbox_tx.clone()
    }

    /// Connect to another mock transport (one-way)
    pub fn connect_to(&self, peer_id: NeighborId, peer_inbox: mpsc::Sender<MockMessage>) {
        self.outgoing.insert(peer_id, peer_inbox);
    }

    /// Disconnect from a peer
    pub fn disconnect_from(&self, peer: &NeighborId) {
        self.outgoing.remove(peer);
    }

    /// Make every send to `peer` fail until cleared
    pub fn fail_sends_to(&self, peer: NeighborId) {
        self.failing.lock().insert(peer);
    }

    /// Stop injecting failures for `peer`
    pub fn clear_failures(&self, peer: &NeighborId) {
        self.failing.lock().remove(peer);
    }

    /// Make every send wait `delay` before delivering
    ///
    /// A send cancelled while waiting delivers nothing and is not recorded.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = delay;
    }

    /// Snapshot of all successful sends so far
    pub fn sent(&self) -> Vec<(NeighborId, Vec<u8>)> {
        self.sent.lock().clone()
    }

    /// Number of successful sends so far
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, peer: &NeighborId, data: Vec<u8>) -> Result<(), TransportError> {
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            trace!(peer = %peer, ?delay, "Delaying mock send");
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(peer) {
            trace!(peer = %peer, "Injected mock send failure");
            return Err(TransportError::SendFailed(format!("injected failure for {peer}")));
        }

        let sender = self
            .outgoing
            .get(peer)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::PeerNotConnected(peer.to_string()))?;

        let msg = MockMessage {
            sender: self.local_id.clone(),
            data: data.clone(),
        };

        sender
            .send(msg)
            .await
            .map_err(|_| TransportError::SendFailed("channel closed".into()))?;

        trace!(from = %self.local_id, to = %peer, bytes = data.len(), "Mock send delivered");
        self.sent.lock().push((peer.clone(), data));
        Ok(())
    }

    async fn recv(&self) -> Result<(NeighborId, Vec<u8>), TransportError> {
        let mut inbox = self.inbox_rx.write().await;
        let msg = inbox
            .recv()
            .await
            .ok_or_else(|| TransportError::ReceiveFailed("channel closed".into()))?;
        Ok((msg.sender, msg.data))
    }

    fn is_connected(&self, peer: &NeighborId) -> bool {
        self.outgoing.contains_key(peer)
    }

    fn connected_peers(&self) -> Vec<NeighborId> {
        self.outgoing.iter().map(|entry| entry.key().clone()).collect()
    }
}

/// Builder for creating interconnected mock transports
pub struct MockTransportBuilder {
    buffer_size: usize,
    send_delay: Duration,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransportBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            buffer_size: 1024,
            send_delay: Duration::ZERO,
        }
    }

    /// Set the buffer size for channels
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Delay every send made by the transports this builder creates
    pub fn send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    fn build(&self, id: NeighborId) -> MockTransport {
        let transport = MockTransport::with_buffer_size(id, self.buffer_size);
        transport.set_send_delay(self.send_delay);
        transport
    }

    /// Create a pair of connected mock transports
    pub fn create_connected_pair(
        &self,
        id_a: NeighborId,
        id_b: NeighborId,
    ) -> (MockTransport, MockTransport) {
        let transport_a = self.build(id_a.clone());
        let transport_b = self.build(id_b.clone());

        transport_a.connect_to(id_b, transport_b.inbox_sender());
        transport_b.connect_to(id_a, transport_a.inbox_sender());

        (transport_a, transport_b)
    }

    /// Create a linear chain of connected transports
    ///
    /// A <-> B <-> C (each connected only to its neighbors). Useful for
    /// multi-hop relay tests.
    pub fn create_chain(&self, ids: Vec<NeighborId>) -> HashMap<NeighborId, MockTransport> {
        let transports: HashMap<NeighborId, MockTransport> = ids
            .iter()
            .map(|id| (id.clone(), self.build(id.clone())))
            .collect();

        for pair in ids.windows(2) {
            if let (Some(a), Some(b)) = (transports.get(&pair[0]), transports.get(&pair[1])) {
                a.connect_to(pair[1].clone(), b.inbox_sender());
                b.connect_to(pair[0].clone(), a.inbox_sender());
            }
        }

        transports
    }
}
