//! # Satnet Transport
//!
//! TCP transport for the Satnet DTN node.
//!
//! ## Features
//!
//! - One connection per neighbor, dialed lazily and reused in both directions
//! - Hello handshake carrying the neighbor ID
//! - Wire protocol framing with postcard and a 4-byte big-endian length prefix
//!
//! ## Example
//!
//! ```rust,ignore
//! use satnet_transport::{TcpTransport, TcpTransportConfig, TcpTransportHandle};
//!
//! let transport = TcpTransport::bind(TcpTransportConfig::new("earth-gw", "0.0.0.0:4556".parse()?)).await?;
//! transport.set_address("relay-1", "10.0.0.7:4556");
//! let handle = TcpTransportHandle(transport);
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod tcp;

pub use config::TcpTransportConfig;
pub use error::FramingError;
pub use protocol::{MAX_FRAME_SIZE, PROTOCOL_VERSION, WireMessage, frame_message};
pub use tcp::{TcpTransport, TcpTransportHandle};
