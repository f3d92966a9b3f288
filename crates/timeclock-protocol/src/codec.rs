//! Tokio codec for pull-protocol framing.
//!
//! `PullCodec` integrates the binary frame layout with async TCP I/O through
//! Tokio's codec traits:
//! - [`Decoder`]: strips the outer wrapper, verifies the checksum, and yields
//!   complete [`Frame`]s from the byte stream
//! - [`Encoder<Frame>`]: writes frames with wrapper and checksum
//!
//! # DoS Protection
//!
//! Incoming frames are bounded by a maximum size (default 64 KB). The length
//! field is validated before any buffering, so a hostile peer cannot make the
//! codec reserve unbounded memory.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{FRAME_MAGIC, Frame, WRAPPER_LEN};
use timeclock_core::{Error, Result};

/// Default maximum inner frame size in bytes (64 KB).
///
/// Bulk data arrives chunked, so no legitimate frame approaches this limit.
const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Tokio codec for pull-protocol frames.
#[derive(Debug)]
pub struct PullCodec {
    /// Maximum allowed inner frame size in bytes.
    max_frame_size: usize,
}

impl PullCodec {
    /// Create a new codec with the default maximum frame size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a new codec with a custom maximum frame size.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Get the current maximum frame size.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for PullCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PullCodec {
    type Item = Frame;
    type Error = Error;

    /// Decode one frame from the byte stream.
    ///
    /// Returns `Ok(None)` until a complete frame has been buffered.
    ///
    /// # Errors
    /// Returns an error if the magic bytes are wrong, the declared length
    /// exceeds `max_frame_size`, or the checksum does not verify. All of
    /// these indicate an unusable stream and the caller should tear the
    /// session down.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < WRAPPER_LEN {
            return Ok(None);
        }

        if src[..4] != FRAME_MAGIC {
            return Err(Error::protocol(format!(
                "Bad frame magic: {:02x} {:02x} {:02x} {:02x}",
                src[0], src[1], src[2], src[3]
            )));
        }

        let inner_len = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if inner_len > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: inner_len,
                max_size: self.max_frame_size,
            });
        }

        if src.len() < WRAPPER_LEN + inner_len {
            // Reserve what the rest of the frame needs and wait for more data
            src.reserve(WRAPPER_LEN + inner_len - src.len());
            return Ok(None);
        }

        src.advance(WRAPPER_LEN);
        let inner = src.split_to(inner_len);
        Frame::parse(&inner).map(Some)
    }
}

impl Encoder<Frame> for PullCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: item.payload.len(),
                max_size: self.max_frame_size,
            });
        }
        item.encode(dst)
    }
}
