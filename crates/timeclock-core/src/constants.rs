//! Protocol and validation constants shared across the workspace.
//!
//! Two mutually incompatible device transports are supported:
//!
//! - **Push**: the device periodically calls the server over HTTP and
//!   delivers newline-delimited, tab-separated table rows.
//! - **Pull**: the server opens a TCP connection to the device and drives a
//!   binary command/response exchange.
//!
//! The limits below are derived from what the device firmware families
//! actually accept; loosening them may break interoperability.

// ============================================================================
// Identifier limits
// ============================================================================

/// Minimum length of a device serial number.
pub const MIN_SERIAL_LENGTH: usize = 1;

/// Maximum length of a device serial number.
pub const MAX_SERIAL_LENGTH: usize = 50;

/// Maximum length of a device-side user id (the PIN field on the device).
pub const MAX_USER_ID_LENGTH: usize = 24;

/// Maximum length of a user display name as stored on the device.
pub const MAX_USER_NAME_LENGTH: usize = 24;

// ============================================================================
// Pull (TCP) transport
// ============================================================================

/// Default TCP port the devices listen on.
pub const DEFAULT_DEVICE_PORT: u16 = 4370;

/// Default timeout for every TCP I/O step (connect, read, write).
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 5_000;

/// Size of one fixed-layout user record in a bulk read payload.
pub const PULL_USER_RECORD_LEN: usize = 72;

/// Size of one fixed-layout punch record in a bulk read payload.
pub const PULL_PUNCH_RECORD_LEN: usize = 40;

// ============================================================================
// Push (HTTP) transport
// ============================================================================

/// Field separator within one pushed table row.
pub const PUSH_FIELD_SEPARATOR: char = '\t';

/// Timestamp format used in pushed ATTLOG/OPERLOG rows.
pub const PUSH_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Acknowledgment body the push handler returns to the device.
pub const PUSH_ACK: &str = "OK";

// ============================================================================
// Scheduling defaults
// ============================================================================

/// How long a per-device pull lease may be held before it is reclaimable.
pub const DEFAULT_LEASE_HOLD_SECS: u64 = 120;

/// Age after which a delivered-but-unacknowledged command counts as stale.
pub const DEFAULT_COMMAND_STALE_SECS: u64 = 24 * 60 * 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_lengths_are_stable() {
        // Wire layouts depend on these; changing them is a protocol break.
        assert_eq!(PULL_USER_RECORD_LEN, 72);
        assert_eq!(PULL_PUNCH_RECORD_LEN, 40);
    }

    #[test]
    fn serial_limits_are_sane() {
        assert!(MIN_SERIAL_LENGTH <= MAX_SERIAL_LENGTH);
    }
}
