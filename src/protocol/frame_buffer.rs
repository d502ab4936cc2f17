//! Frame buffer for accumulating partial reads.
//!
//! Strict decoder for the length-prefixed format. The monitor session itself
//! scans replies for tokens instead (see [`ReplyScanner`](super::ReplyScanner)),
//! so this buffer serves tooling and scripted backends that need exact
//! frame boundaries.
//!
//! State machine:
//! - `WaitingForHeader`: Need at least 8 bytes
//! - `WaitingForPayload`: Length parsed, need N more payload bytes
//!
//! # Example
//!
//! ```
//! use mythwire_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//! assert!(buffer.push(b"4       DO").unwrap().is_empty());
//!
//! let frames = buffer.push(b"NE").unwrap();
//! assert_eq!(frames[0].text(), "DONE");
//! ```

use bytes::BytesMut;

use super::wire_format::{decode_length_header, LENGTH_FIELD_SIZE, MAX_PAYLOAD_SIZE};
use super::Frame;
use crate::error::{MythwireError, Result};

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForHeader,
    WaitingForPayload { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_payload_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer accepting payloads up to the protocol limit.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with a custom max payload size.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns error if a length field is malformed or exceeds the maximum.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < LENGTH_FIELD_SIZE {
                    return Ok(None);
                }

                let length = decode_length_header(&self.buffer[..LENGTH_FIELD_SIZE])?;
                if length > self.max_payload_size {
                    return Err(MythwireError::Framing(format!(
                        "Payload size {} exceeds maximum {}",
                        length, self.max_payload_size
                    )));
                }

                let _ = self.buffer.split_to(LENGTH_FIELD_SIZE);
                self.state = State::WaitingForPayload { remaining: length };
                self.try_extract_one()
            }

            State::WaitingForPayload { remaining } => {
                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(payload)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
