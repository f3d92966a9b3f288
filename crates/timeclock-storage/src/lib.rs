//! Storage layer for the timeclock synchronization backend.
//!
//! SQLite-backed persistence for devices, enrolled users, attendance
//! punches, queued commands, sync audit runs, and personnel links.
//!
//! # Architecture
//!
//! - [`Database`] - connection pool manager with automatic migrations
//! - Repository traits per entity with SQLite implementations
//!
//! All data access goes through the repository traits, which keeps
//! ingestion logic independent of persistence and makes mocking trivial.
//!
//! # Idempotent ingestion
//!
//! The two hot-path writes are shaped for safe re-processing:
//!
//! - Attendance inserts use `ON CONFLICT DO NOTHING` against the natural
//!   identity tuple, so replaying a batch changes nothing after the first
//!   application
//! - Device users are write-once per (device, user id): re-imports never
//!   overwrite locally edited fields
//!
//! # Example
//!
//! ```no_run
//! use timeclock_storage::{Database, DatabaseConfig};
//! use timeclock_storage::repositories::{DeviceRepository, SqliteDeviceRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("timeclock.db")).await?;
//! let devices = SqliteDeviceRepository::new(db.pool().clone());
//!
//! if let Some(device) = devices.find_by_serial("CJXU201560042").await? {
//!     println!("{} last seen {:?}", device.serial, device.last_seen);
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{
    AttendanceLog, Command, CommandKind, CommandState, Device, DeviceUser, NewAttendanceLog,
    NewDevice, NewDeviceUser, PersonnelLink, SyncOperation, SyncRun, SyncStatus,
};
pub use repositories::{
    AttendanceLogRepository, CommandRepository, DeviceRepository, DeviceUserRepository,
    PersonnelRepository, RunCounts, SqliteAttendanceLogRepository, SqliteCommandRepository,
    SqliteDeviceRepository, SqliteDeviceUserRepository, SqlitePersonnelRepository,
    SqliteSyncRunRepository, SyncRunRepository,
};
