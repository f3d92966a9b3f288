//! Pull-protocol frame layout and checksum.
//!
//! Every exchange on the TCP wire is a frame:
//!
//! ```text
//! +------------+-----------+---------------------------------------+
//! | magic (4)  | len (4)   | inner frame (len bytes)               |
//! +------------+-----------+---------------------------------------+
//!
//! inner frame:
//! +--------------+---------------+----------------+---------------+---------+
//! | command (2)  | checksum (2)  | session id (2) | reply id (2)  | payload |
//! +--------------+---------------+----------------+---------------+---------+
//! ```
//!
//! All integers are little-endian. The checksum is the ones-complement of the
//! 16-bit word sum over the inner frame with the checksum field zeroed.

use crate::commands::CommandCode;
use bytes::{BufMut, Bytes, BytesMut};
use timeclock_core::{Error, Result};

/// Leading magic of the outer wrapper.
pub const FRAME_MAGIC: [u8; 4] = [0x50, 0x50, 0x82, 0x7D];

/// Size of the outer wrapper (magic + length).
pub const WRAPPER_LEN: usize = 8;

/// Size of the inner frame header.
pub const HEADER_LEN: usize = 8;

/// A single pull-protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: CommandCode,
    pub session_id: u16,
    pub reply_id: u16,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with an empty payload.
    #[must_use]
    pub fn new(command: CommandCode, session_id: u16, reply_id: u16) -> Self {
        Frame {
            command,
            session_id,
            reply_id,
            payload: Bytes::new(),
        }
    }

    /// Create a frame with a payload.
    #[must_use]
    pub fn with_payload(
        command: CommandCode,
        session_id: u16,
        reply_id: u16,
        payload: Bytes,
    ) -> Self {
        Frame {
            command,
            session_id,
            reply_id,
            payload,
        }
    }

    /// Total size on the wire including the outer wrapper.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        WRAPPER_LEN + HEADER_LEN + self.payload.len()
    }

    /// Encode into wire bytes, wrapper included.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let inner_len = HEADER_LEN + self.payload.len();
        if inner_len > u32::MAX as usize {
            return Err(Error::protocol("Payload exceeds wire length field"));
        }

        dst.reserve(WRAPPER_LEN + inner_len);
        dst.put_slice(&FRAME_MAGIC);
        dst.put_u32_le(inner_len as u32);

        let checksum = frame_checksum(
            self.command.to_u16(),
            self.session_id,
            self.reply_id,
            &self.payload,
        );
        dst.put_u16_le(self.command.to_u16());
        dst.put_u16_le(checksum);
        dst.put_u16_le(self.session_id);
        dst.put_u16_le(self.reply_id);
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Parse an inner frame (header + payload, wrapper already stripped),
    /// verifying the checksum.
    pub fn parse(inner: &[u8]) -> Result<Self> {
        if inner.len() < HEADER_LEN {
            return Err(Error::protocol(format!(
                "Frame header truncated: {} bytes",
                inner.len()
            )));
        }

        let command_raw = u16::from_le_bytes([inner[0], inner[1]]);
        let expected = u16::from_le_bytes([inner[2], inner[3]]);
        let session_id = u16::from_le_bytes([inner[4], inner[5]]);
        let reply_id = u16::from_le_bytes([inner[6], inner[7]]);
        let payload = &inner[HEADER_LEN..];

        let actual = frame_checksum(command_raw, session_id, reply_id, payload);
        if actual != expected {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        Ok(Frame {
            command: CommandCode::from_u16(command_raw)?,
            session_id,
            reply_id,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

/// Compute the inner-frame checksum with the checksum field zeroed.
///
/// 16-bit little-endian word sum with end-around carry, then ones-complement.
/// An odd trailing byte is summed as-is.
#[must_use]
pub fn frame_checksum(command: u16, session_id: u16, reply_id: u16, payload: &[u8]) -> u16 {
    let mut sum: u32 = u32::from(command) + u32::from(session_id) + u32::from(reply_id);

    let mut chunks = payload.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_le_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last);
    }

    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
