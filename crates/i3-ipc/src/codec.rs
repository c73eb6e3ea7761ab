//! Frame encoding and decoding
//!
//! Wire layout, all integers little-endian:
//!
//! ```text
//! [magic: N bytes][payload_length: u32][message_type: u32][payload]
//! ```
//!
//! The codec is stateless. Reassembly of frames split across socket reads
//! happens in [`Connection`](crate::Connection), driven by
//! [`Decoded::Incomplete`].

use tracing::warn;

use crate::error::{IpcError, Result};
use crate::types::{AsMessageType, Frame, Payload};

/// Magic marker i3 expects at the start of every frame
pub const DEFAULT_MAGIC: &[u8] = b"i3-ipc";

/// Upper bound on a payload length accepted from the wire (64 MiB)
pub const DEFAULT_MAX_PAYLOAD: u32 = 64 * 1024 * 1024;

/// Size of the two integer header fields
const INT_FIELDS_SIZE: usize = 8;

/// Raw header fields, magic not yet validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header<'a> {
    pub magic: &'a [u8],
    pub payload_length: u32,
    pub message_type: u32,
}

/// Outcome of decoding a byte slice
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A full frame, which used the first `consumed` bytes of the slice
    Complete { frame: Frame, consumed: usize },
    /// More bytes are needed before the frame can be decoded
    Incomplete { needed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCodec {
    magic: Vec<u8>,
    max_payload: u32,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAGIC)
    }
}

impl FrameCodec {
    pub fn new(magic: impl Into<Vec<u8>>) -> Self {
        Self {
            magic: magic.into(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn with_max_payload(mut self, max_payload: u32) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn magic(&self) -> &[u8] {
        &self.magic
    }

    pub fn header_size(&self) -> usize {
        self.magic.len() + INT_FIELDS_SIZE
    }

    /// Encode a message into a single frame
    ///
    /// The length field is the UTF-8 byte length of `payload`, which differs
    /// from its character count for anything outside ASCII.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::UnsupportedMessageType` if `message_type` is not in
    /// the message table.
    pub fn encode(&self, message_type: impl AsMessageType, payload: &str) -> Result<Vec<u8>> {
        let message_type = message_type.to_message_type()?;
        let body = payload.as_bytes();
        let length = u32::try_from(body.len()).map_err(|_| IpcError::MalformedFrame {
            reason: format!("payload of {} bytes does not fit a frame", body.len()),
        })?;

        let mut buf = Vec::with_capacity(self.header_size() + body.len());
        buf.extend_from_slice(&self.magic);
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&message_type.index().to_le_bytes());
        buf.extend_from_slice(body);
        Ok(buf)
    }

    /// Read the fixed-size header from the start of `bytes`
    ///
    /// Returns `None` when fewer than `header_size()` bytes are available.
    /// The magic is returned as found; checking it is up to the caller.
    pub fn decode_header<'a>(&self, bytes: &'a [u8]) -> Option<Header<'a>> {
        let magic_len = self.magic.len();
        if bytes.len() < self.header_size() {
            return None;
        }
        let int_at = |offset: usize| {
            let mut field = [0u8; 4];
            field.copy_from_slice(&bytes[offset..offset + 4]);
            u32::from_le_bytes(field)
        };
        Some(Header {
            magic: &bytes[..magic_len],
            payload_length: int_at(magic_len),
            message_type: int_at(magic_len + 4),
        })
    }

    /// Decode the frame at the start of `bytes`
    ///
    /// # Errors
    ///
    /// Returns `IpcError::MalformedFrame` if the magic does not match or the
    /// advertised payload length exceeds the configured maximum.
    pub fn decode_frame(&self, bytes: &[u8]) -> Result<Decoded> {
        let header_size = self.header_size();
        let Some(header) = self.decode_header(bytes) else {
            return Ok(Decoded::Incomplete {
                needed: header_size - bytes.len(),
            });
        };

        if header.magic != self.magic.as_slice() {
            return Err(IpcError::MalformedFrame {
                reason: format!(
                    "expected magic {:?}, got {:?}",
                    String::from_utf8_lossy(&self.magic),
                    String::from_utf8_lossy(header.magic)
                ),
            });
        }

        if header.payload_length > self.max_payload {
            return Err(IpcError::MalformedFrame {
                reason: format!(
                    "payload length {} exceeds maximum of {}",
                    header.payload_length, self.max_payload
                ),
            });
        }

        let total = header_size + header.payload_length as usize;
        if bytes.len() < total {
            return Ok(Decoded::Incomplete {
                needed: total - bytes.len(),
            });
        }

        let raw = match String::from_utf8(bytes[header_size..total].to_vec()) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    message_type = header.message_type,
                    "Frame payload is not valid UTF-8, decoding lossily"
                );
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        Ok(Decoded::Complete {
            frame: Frame {
                message_type: header.message_type,
                payload: Payload::parse(raw),
            },
            consumed: total,
        })
    }
}
