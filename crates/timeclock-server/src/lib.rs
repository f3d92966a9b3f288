//! Backend service wiring for timeclock device synchronization.
//!
//! Two transports feed the same storage:
//!
//! - **Push**: devices dial out over HTTP; the [`push`] router ingests their
//!   uploads and drains the command queue on each handshake.
//! - **Pull**: the [`service::SyncService`] polls devices over TCP on
//!   operator request, guarded by a per-device [`lease::DeviceLeases`] claim
//!   and recorded as sync runs.
//!
//! The [`import::ImportEngine`] sits under both so replayed data is
//! deduplicated identically regardless of how it arrived.

pub mod config;
pub mod error;
pub mod import;
pub mod lease;
pub mod push;
pub mod service;

pub use config::ServerConfig;
pub use error::{ServiceError, ServiceResult};
pub use import::{AttendanceImportSummary, ImportEngine, UserImportSummary};
pub use lease::{DeviceLeases, LeaseGuard};
pub use push::{PushState, router};
pub use service::SyncService;
