//! TCP transport
//!
//! One TCP connection per neighbor, used in both directions. Outbound
//! connections are dialed lazily on the first send to a neighbor whose
//! address has been registered with [`TcpTransport::set_address`].

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use satnet_core::{NeighborId, Transport, TransportError};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::config::TcpTransportConfig;
use crate::error::FramingError;
use crate::protocol::{PROTOCOL_VERSION, WireMessage, read_message, write_message};

/// An established, handshaken connection
struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    remote: SocketAddr,
}

/// Transport over TCP with length-prefixed frames
pub struct TcpTransport {
    config: TcpTransportConfig,
    local_addr: SocketAddr,
    /// Live connections indexed by neighbor
    connections: DashMap<NeighborId, Arc<Connection>>,
    /// Dial addresses indexed by neighbor
    addresses: DashMap<NeighborId, String>,
    inbox_tx: mpsc::Sender<(NeighborId, Vec<u8>)>,
    inbox_rx: Mutex<mpsc::Receiver<(NeighborId, Vec<u8>)>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TcpTransport {
    /// Bind the listener and start accepting connections
    #[instrument(skip(config), fields(local_id = %config.local_id, listen = %config.listen_addr))]
    pub async fn bind(config: TcpTransportConfig) -> Result<Arc<Self>, TransportError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("bind: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity);
        let (shutdown_tx, _) = broadcast::channel(1);

        let transport = Arc::new(Self {
            config,
            local_addr,
            connections: DashMap::new(),
            addresses: DashMap::new(),
            inbox_tx,
            inbox_rx: Mutex::new(inbox_rx),
            shutdown_tx,
        });

        let shutdown_rx = transport.shutdown_tx.subscribe();
        tokio::spawn(Arc::clone(&transport).accept_loop(listener, shutdown_rx));

        info!(addr = %local_addr, "TCP transport listening");
        Ok(transport)
    }

    /// Our identity
    pub fn local_id(&self) -> &NeighborId {
        &self.config.local_id
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register the dial address for a neighbor
    pub fn set_address(&self, neighbor: impl Into<NeighborId>, address: impl Into<String>) {
        self.addresses.insert(neighbor.into(), address.into());
    }

    /// Close every connection and stop accepting new ones
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.connections.clear();
        info!("TCP transport shut down");
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Accept loop stopping");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote)) => {
                            let transport = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = transport.handle_incoming(stream, remote).await {
                                    warn!(remote = %remote, error = %e, "Inbound handshake failed");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "Accept failed"),
                    }
                }
            }
        }
    }

    async fn handle_incoming(
        self: Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
    ) -> Result<(), TransportError> {
        let (mut reader, mut writer) = stream.into_split();
        let peer = self.read_hello(&mut reader).await?;
        write_message(
            &mut writer,
            &WireMessage::hello(self.config.local_id.as_str()),
            self.config.max_frame_size,
        )
        .await?;

        debug!(peer = %peer, remote = %remote, "Accepted connection");
        self.register(peer, reader, writer, remote);
        Ok(())
    }

    async fn read_hello(&self, reader: &mut OwnedReadHalf) -> Result<NeighborId, TransportError> {
        let hello = tokio::time::timeout(
            self.config.handshake_timeout,
            read_message(reader, self.config.max_frame_size),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;

        match hello {
            WireMessage::Hello {
                version,
                neighbor_id,
            } if version == PROTOCOL_VERSION => Ok(NeighborId::new(neighbor_id)),
            WireMessage::Hello { version, .. } => Err(TransportError::ConnectionFailed(format!(
                "unsupported protocol version {version}"
            ))),
            WireMessage::Bundle(_) => Err(TransportError::ConnectionFailed(
                "expected hello".to_string(),
            )),
        }
    }

    fn register(
        self: &Arc<Self>,
        peer: NeighborId,
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        remote: SocketAddr,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection {
            writer: Mutex::new(writer),
            remote,
        });
        if self.connections.insert(peer.clone(), Arc::clone(&conn)).is_some() {
            debug!(peer = %peer, "Replaced existing connection");
        }

        let transport = Arc::clone(self);
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(transport.read_loop(peer, reader, Arc::clone(&conn), shutdown_rx));
        conn
    }

    async fn read_loop(
        self: Arc<Self>,
        peer: NeighborId,
        mut reader: OwnedReadHalf,
        conn: Arc<Connection>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            let message = tokio::select! {
                _ = shutdown_rx.recv() => break,
                message = read_message(&mut reader, self.config.max_frame_size) => message,
            };

            match message {
                Ok(WireMessage::Bundle(data)) => {
                    if self.inbox_tx.send((peer.clone(), data)).await.is_err() {
                        break;
                    }
                }
                Ok(WireMessage::Hello { .. }) => {
                    warn!(peer = %peer, "Unexpected hello on established connection");
                }
                Err(FramingError::Closed) => {
                    debug!(peer = %peer, "Connection closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Read failed");
                    break;
                }
            }
        }

        self.connections
            .remove_if(&peer, |_, current| Arc::ptr_eq(current, &conn));
    }

    #[instrument(skip(self), fields(local_id = %self.config.local_id))]
    async fn dial(self: &Arc<Self>, peer: &NeighborId) -> Result<Arc<Connection>, TransportError> {
        let address = self
            .addresses
            .get(peer)
            .map(|a| a.value().clone())
            .ok_or_else(|| TransportError::PeerNotConnected(peer.to_string()))?;

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectionFailed(format!("{address}: {e}")))?;
        let remote = stream
            .peer_addr()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (mut reader, mut writer) = stream.into_split();
        write_message(
            &mut writer,
            &WireMessage::hello(self.config.local_id.as_str()),
            self.config.max_frame_size,
        )
        .await?;
        let announced = self.read_hello(&mut reader).await?;
        if &announced != peer {
            return Err(TransportError::ConnectionFailed(format!(
                "expected {peer}, remote announced {announced}"
            )));
        }

        info!(peer = %peer, remote = %remote, "Connection established");
        Ok(self.register(announced, reader, writer, remote))
    }

    async fn connection_for(self: &Arc<Self>, peer: &NeighborId) -> Result<Arc<Connection>, TransportError> {
        if let Some(conn) = self.connections.get(peer) {
            return Ok(Arc::clone(conn.value()));
        }
        self.dial(peer).await
    }

    /// Send over an `Arc` handle, dialing when needed
    pub async fn send_to(self: &Arc<Self>, peer: &NeighborId, data: Vec<u8>) -> Result<(), TransportError> {
        let conn = self.connection_for(peer).await?;
        let mut writer = conn.writer.lock().await;
        let result = write_message(&mut *writer, &WireMessage::Bundle(data), self.config.max_frame_size).await;
        drop(writer);

        match result {
            Ok(()) => Ok(()),
            Err(FramingError::MessageTooLarge { size, max }) => {
                Err(TransportError::FrameTooLarge { size, max })
            }
            Err(e) => {
                warn!(peer = %peer, remote = %conn.remote, error = %e, "Send failed, dropping connection");
                self.connections
                    .remove_if(peer, |_, current| Arc::ptr_eq(current, &conn));
                Err(TransportError::SendFailed(e.to_string()))
            }
        }
    }
}

/// Handle implementing [`Transport`] for a shared [`TcpTransport`]
#[derive(Clone)]
pub struct TcpTransportHandle(pub Arc<TcpTransport>);

#[async_trait]
impl Transport for TcpTransportHandle {
    async fn send(&self, neighbor: &NeighborId, data: Vec<u8>) -> Result<(), TransportError> {
        self.0.send_to(neighbor, data).await
    }

    async fn recv(&self) -> Result<(NeighborId, Vec<u8>), TransportError> {
        let mut rx = self.0.inbox_rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self, neighbor: &NeighborId) -> bool {
        self.0.connections.contains_key(neighbor)
    }

    fn connected_peers(&self) -> Vec<NeighborId> {
        self.0.connections.iter().map(|e| e.key().clone()).collect()
    }
}
