//! Database entity models.

mod attendance_log;
mod command;
mod device;
mod device_user;
mod personnel;
mod sync_run;

pub use attendance_log::{AttendanceLog, NewAttendanceLog};
pub use command::{Command, CommandKind, CommandState};
pub use device::{Device, NewDevice, transport_from_i32, transport_to_i32};
pub use device_user::{DeviceUser, NewDeviceUser};
pub use personnel::PersonnelLink;
pub use sync_run::{SyncOperation, SyncRun, SyncStatus};
