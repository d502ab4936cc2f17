//! Frame struct and async single-frame reader.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use mythwire_client::protocol::Frame;
//! use bytes::Bytes;
//!
//! let frame = Frame::new(Bytes::from_static(b"OK"));
//! assert_eq!(frame.length, 2);
//! assert_eq!(frame.text(), "OK");
//! ```

use std::borrow::Cow;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{decode_length_header, encode, LENGTH_FIELD_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{MythwireError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload byte count, as carried in the length field.
    pub length: usize,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from a payload.
    pub fn new(payload: Bytes) -> Self {
        Self {
            length: payload.len(),
            payload,
        }
    }

    /// Create a frame from raw bytes (copies data).
    pub fn from_slice(payload: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(payload))
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload interpreted as (lossy) ASCII text.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Encode back into wire form.
    pub fn to_bytes(&self) -> Result<Bytes> {
        encode(&self.payload)
    }
}

/// Read exactly one frame from an async reader.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary. A stream
/// that ends in the middle of a frame is an I/O error (`UnexpectedEof`).
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_FIELD_SIZE];
    let mut filled = 0;

    while filled < LENGTH_FIELD_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(MythwireError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream ended inside a length field",
            )));
        }
        filled += n;
    }

    let length = decode_length_header(&header)?;
    if length > MAX_PAYLOAD_SIZE {
        return Err(MythwireError::Framing(format!(
            "Payload size {} exceeds maximum {}",
            length, MAX_PAYLOAD_SIZE
        )));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame::new(Bytes::from(payload))))
}
