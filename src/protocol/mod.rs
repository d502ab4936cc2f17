//! Protocol module - wire format, framing, commands and reply scanning.
//!
//! This module implements the backend control protocol:
//! - 8-byte ASCII length field encoding/decoding
//! - Frame buffer for strict decoding across partial reads
//! - Control command templates and recognized reply tokens
//! - Reply scanner used by the monitor session

mod commands;
mod frame;
mod frame_buffer;
mod scanner;
mod wire_format;

pub use commands::{
    announce_monitor_command, proto_version_command, Token, ALLOW_SHUTDOWN, BLOCK_SHUTDOWN, DONE,
    FIELD_SEPARATOR, PROTO_VERSION_COMMAND,
};
pub use frame::{read_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use scanner::{Reply, ReplyScanner};
pub use wire_format::{
    decode_length_header, encode, encode_length_header, LENGTH_FIELD_SIZE, MAX_PAYLOAD_SIZE,
};
