//! Wire format encoding and decoding.
//!
//! Every frame is an 8-byte ASCII length field followed by the payload:
//! ```text
//! ┌──────────────────────┬─────────────────────┐
//! │ Length               │ Payload             │
//! │ 8 bytes, ASCII       │ `Length` bytes      │
//! │ decimal, left-       │ (ASCII text for all │
//! │ justified, space pad │ control commands)   │
//! └──────────────────────┴─────────────────────┘
//! ```
//!
//! For example `DONE` goes out as `b"4       DONE"`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MythwireError, Result};

/// Length field size in bytes (fixed, exactly 8).
pub const LENGTH_FIELD_SIZE: usize = 8;

/// Largest payload whose length still fits in 8 decimal digits.
pub const MAX_PAYLOAD_SIZE: usize = 99_999_999;

/// Encode a payload length as the 8-byte wire header.
///
/// # Example
///
/// ```
/// use mythwire_client::protocol::encode_length_header;
///
/// let header = encode_length_header(14).unwrap();
/// assert_eq!(&header, b"14      ");
/// ```
pub fn encode_length_header(len: usize) -> Result<[u8; LENGTH_FIELD_SIZE]> {
    if len > MAX_PAYLOAD_SIZE {
        return Err(MythwireError::Framing(format!(
            "Payload size {} does not fit the {}-digit length field",
            len, LENGTH_FIELD_SIZE
        )));
    }

    let digits = len.to_string();
    let mut header = [b' '; LENGTH_FIELD_SIZE];
    header[..digits.len()].copy_from_slice(digits.as_bytes());
    Ok(header)
}

/// Decode the 8-byte wire header into a payload length.
///
/// Surrounding spaces are ignored, so both the left-justified form this
/// client writes and a right-justified form (`b"       7"`) are accepted.
///
/// # Example
///
/// ```
/// use mythwire_client::protocol::decode_length_header;
///
/// assert_eq!(decode_length_header(b"4       ").unwrap(), 4);
/// assert_eq!(decode_length_header(b"      18").unwrap(), 18);
/// ```
pub fn decode_length_header(buf: &[u8]) -> Result<usize> {
    if buf.len() < LENGTH_FIELD_SIZE {
        return Err(MythwireError::Framing(format!(
            "Length field needs {} bytes, got {}",
            LENGTH_FIELD_SIZE,
            buf.len()
        )));
    }

    let field = &buf[..LENGTH_FIELD_SIZE];
    let digits = field.trim_ascii();

    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(MythwireError::Framing(format!(
            "Malformed length field {:?}",
            String::from_utf8_lossy(field)
        )));
    }

    // At most 8 ASCII digits, always representable.
    Ok(digits
        .iter()
        .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0')))
}

/// Encode a payload into a complete frame (length field + payload).
///
/// # Example
///
/// ```
/// use mythwire_client::protocol::encode;
///
/// let frame = encode(b"DONE").unwrap();
/// assert_eq!(&frame[..], b"4       DONE");
/// ```
pub fn encode(payload: &[u8]) -> Result<Bytes> {
    let header = encode_length_header(payload.len())?;
    let mut buf = BytesMut::with_capacity(LENGTH_FIELD_SIZE + payload.len());
    buf.put_slice(&header);
    buf.put_slice(payload);
    Ok(buf.freeze())
}
