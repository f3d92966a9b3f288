use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("Device unreachable: {detail}")]
    DeviceUnreachable { detail: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Frame too large: {size} bytes exceeds maximum of {max_size}")]
    FrameTooLarge { size: usize, max_size: usize },

    // Scheduling errors
    #[error("Device busy: {serial} already has a pull session in flight")]
    DeviceBusy { serial: String },

    // Validation errors
    #[error("Invalid date range: {message}")]
    InvalidRange { message: String },

    #[error("Invalid device serial: {0}")]
    InvalidSerial(String),

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Invalid punch kind code: {code}")]
    InvalidPunchKind { code: u8 },

    #[error("Invalid verify method code: {code}")]
    InvalidVerifyMethod { code: u8 },

    #[error("Invalid privilege code: {code}")]
    InvalidPrivilege { code: u8 },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a protocol violation.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
