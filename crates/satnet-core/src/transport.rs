//! Transport abstraction
//!
//! The [`Transport`] trait gives the node reliable delivery of a byte buffer
//! to a named neighbor, and a stream of buffers received from neighbors.
//! Framing, retries and connection management below this line belong to
//! the implementation.
//!
//! ## Implementations
//!
//! - [`MockTransport`](crate::MockTransport): in-memory channels for tests
//! - `TcpTransport`: length-prefixed frames over TCP (in satnet-transport)

use async_trait::async_trait;

use crate::error::TransportError;
use crate::neighbor::NeighborId;

/// Transport trait for moving bundle bytes between neighbors
///
/// `send` returning `Ok` means the transport accepted the bytes for
/// reliable delivery; the node treats that as the acknowledgment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send data to a specific neighbor
    ///
    /// # Errors
    ///
    /// Returns an error if the neighbor is not reachable or sending fails.
    async fn send(&self, neighbor: &NeighborId, data: Vec<u8>) -> Result<(), TransportError>;

    /// Receive data from any neighbor
    ///
    /// Blocks until data is available. Returns a tuple of (sender, data).
    async fn recv(&self) -> Result<(NeighborId, Vec<u8>), TransportError>;

    /// Check if we currently hold a connection to a neighbor
    fn is_connected(&self, neighbor: &NeighborId) -> bool;

    /// Get all currently connected neighbors
    fn connected_peers(&self) -> Vec<NeighborId>;

    /// Get the number of connected neighbors
    fn connection_count(&self) -> usize {
        self.connected_peers().len()
    }
}
