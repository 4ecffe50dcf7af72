//! Wire protocol
//!
//! Every message on a TCP connection is a postcard-encoded [`WireMessage`]
//! prefixed by its length as a 4-byte big-endian integer. The first message
//! in each direction is a [`WireMessage::Hello`] naming the sender.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FramingError;

/// Protocol version carried in the hello
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest frame body accepted (10 MiB plus envelope headroom)
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024 + 64 * 1024;

/// Message exchanged between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Connection handshake
    Hello { version: u8, neighbor_id: String },
    /// An encoded bundle
    Bundle(Vec<u8>),
}

impl WireMessage {
    /// Build a hello for `neighbor_id`
    pub fn hello(neighbor_id: impl Into<String>) -> Self {
        Self::Hello {
            version: PROTOCOL_VERSION,
            neighbor_id: neighbor_id.into(),
        }
    }
}

/// Frame a message for wire transmission
pub fn frame_message(msg: &WireMessage, max_size: usize) -> Result<Bytes, FramingError> {
    let serialized =
        postcard::to_allocvec(msg).map_err(|e| FramingError::Serialization(e.to_string()))?;

    if serialized.len() > max_size {
        return Err(FramingError::MessageTooLarge {
            size: serialized.len(),
            max: max_size,
        });
    }

    let mut framed = BytesMut::with_capacity(4 + serialized.len());
    framed.put_u32(serialized.len() as u32);
    framed.put_slice(&serialized);
    Ok(framed.freeze())
}

/// Write one framed message
pub async fn write_message<W>(
    writer: &mut W,
    msg: &WireMessage,
    max_size: usize,
) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    let framed = frame_message(msg, max_size)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message
///
/// A clean end of stream before the length prefix yields
/// [`FramingError::Closed`].
pub async fn read_message<R>(reader: &mut R, max_size: usize) -> Result<WireMessage, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FramingError::Closed),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(FramingError::MessageTooLarge {
            size: len,
            max: max_size,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    postcard::from_bytes(&body).map_err(|e| FramingError::Deserialization(e.to_string()))
}
