//! TCP transport configuration

use std::net::SocketAddr;
use std::time::Duration;

use satnet_core::NeighborId;

use crate::protocol::MAX_FRAME_SIZE;

/// Configuration for [`TcpTransport`](crate::TcpTransport)
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Identity announced in the hello
    pub local_id: NeighborId,
    /// Address to accept connections on
    pub listen_addr: SocketAddr,
    /// Timeout for dialing a neighbor
    pub connect_timeout: Duration,
    /// Timeout for the hello exchange
    pub handshake_timeout: Duration,
    /// Largest frame accepted or sent
    pub max_frame_size: usize,
    /// Capacity of the receive queue
    pub inbox_capacity: usize,
}

impl TcpTransportConfig {
    /// Create a configuration with default timeouts
    pub fn new(local_id: impl Into<NeighborId>, listen_addr: SocketAddr) -> Self {
        Self {
            local_id: local_id.into(),
            listen_addr,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            max_frame_size: MAX_FRAME_SIZE,
            inbox_capacity: 1024,
        }
    }

    /// Set the dial timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the maximum frame size
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the receive queue capacity
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }
}
