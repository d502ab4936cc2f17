//! Outbound frame writing.
//!
//! Control frames are tiny and rare, so there is no writer task or queue:
//! the session writes each frame in place, in the order the state machine
//! produced them. Header and payload go out in one `write_vectored` call
//! where the kernel allows it.

use std::io::IoSlice;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{MythwireError, Result};
use crate::protocol::{encode_length_header, LENGTH_FIELD_SIZE};

/// A frame ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Pre-encoded length field (8 bytes).
    pub header: [u8; LENGTH_FIELD_SIZE],
    /// Payload bytes.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame, encoding its length field.
    pub fn new(payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        Ok(Self {
            header: encode_length_header(payload.len())?,
            payload,
        })
    }

    /// Total size of this frame (length field + payload).
    #[inline]
    pub fn size(&self) -> usize {
        LENGTH_FIELD_SIZE + self.payload.len()
    }

    /// Payload as lossy text.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Wire bytes (length field followed by payload).
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(&self.header);
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Write one frame and flush, continuing after partial writes.
pub async fn write_frame<W>(writer: &mut W, frame: &OutboundFrame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size = frame.size();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = remaining_slices(frame, total_written);
        let written = writer.write_vectored(&slices).await?;

        if written == 0 {
            return Err(MythwireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }

        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// [`write_frame`] bounded by `timeout`.
pub async fn write_frame_timeout<W>(
    writer: &mut W,
    frame: &OutboundFrame,
    timeout: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, write_frame(writer, frame)).await {
        Ok(result) => result,
        Err(_) => Err(MythwireError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("send timed out after {:?}", timeout),
        ))),
    }
}

/// IoSlices for the part of `frame` not yet written.
fn remaining_slices(frame: &OutboundFrame, skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(2);

    if skip_bytes < LENGTH_FIELD_SIZE {
        slices.push(IoSlice::new(&frame.header[skip_bytes..]));
    }

    if !frame.payload.is_empty() {
        let start_in_payload = skip_bytes.saturating_sub(LENGTH_FIELD_SIZE);
        if start_in_payload < frame.payload.len() {
            slices.push(IoSlice::new(&frame.payload[start_in_payload..]));
        }
    }

    slices
}
