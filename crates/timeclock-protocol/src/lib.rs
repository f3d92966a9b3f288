//! Wire codecs for both timeclock transports.
//!
//! Two independent formats normalize into the canonical records defined in
//! `timeclock-core`, so everything downstream of a codec is format-agnostic:
//!
//! - [`push`]: newline-delimited, tab-separated text posted by devices over
//!   HTTP, grouped by table discriminator
//! - [`codec`]/[`frame`]/[`records`]: binary command/response frames polled
//!   from devices over TCP, with fixed-layout bulk records

pub mod codec;
pub mod commands;
pub mod frame;
pub mod push;
pub mod records;

pub use codec::PullCodec;
pub use commands::CommandCode;
pub use frame::{FRAME_MAGIC, Frame, HEADER_LEN, WRAPPER_LEN, frame_checksum};
pub use push::{
    LineFailure, PushBatch, PushRecord, PushTable, decode_batch, decode_line, encode_user_line,
    format_command_reply, format_handshake_body,
};
pub use records::{
    decode_packed_time, decode_punch, decode_time_payload, decode_user, encode_packed_time,
    encode_time_payload, encode_user,
};
