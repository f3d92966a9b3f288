use thiserror::Error;
use timeclock_storage::StorageError;

/// Errors surfaced by the sync service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Another operation holds the device lease
    #[error("Device {serial} is busy")]
    DeviceBusy { serial: String },

    /// No device registered under this serial
    #[error("Unknown device serial: {serial}")]
    UnknownDevice { serial: String },

    /// The device does not speak the pull protocol
    #[error("Device {serial} is not pull-capable")]
    NotPullCapable { serial: String },

    /// The device has no usable network address on record
    #[error("Device {serial} has no valid address: {detail}")]
    BadAddress { serial: String, detail: String },

    /// Device-facing failure, already collapsed into the shared taxonomy
    #[error(transparent)]
    Device(#[from] timeclock_core::Error),

    /// Persistence failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
