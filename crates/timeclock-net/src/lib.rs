//! TCP client layer for polling pull-protocol devices.

pub mod session;

pub use session::{DeviceInfo, DeviceSession, RecordIter, SessionConfig, SessionError};
