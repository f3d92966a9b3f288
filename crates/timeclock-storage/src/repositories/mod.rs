//! Repository traits and their SQLite implementations.

mod attendance_log;
mod command;
mod device;
mod device_user;
mod personnel;
mod sync_run;

pub use attendance_log::{AttendanceLogRepository, SqliteAttendanceLogRepository};
pub use command::{CommandRepository, SqliteCommandRepository};
pub use device::{DeviceRepository, SqliteDeviceRepository};
pub use device_user::{DeviceUserRepository, SqliteDeviceUserRepository};
pub use personnel::{PersonnelRepository, SqlitePersonnelRepository};
pub use sync_run::{RunCounts, SqliteSyncRunRepository, SyncRunRepository};
