use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use timeclock_core::{Provenance, PunchKind, PunchRecord, VerifyMethod};

/// One stored clock punch.
///
/// The natural identity is the tuple (device, user id, punch time, punch
/// kind); a unique index on it makes re-ingestion of the same wire data a
/// skip rather than a duplicate. `punch_time` is naive wall-clock time as
/// reported by the device.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceLog {
    /// Auto-increment primary key
    pub id: i64,

    pub device_id: i64,

    /// Identifier as enrolled on the device
    pub user_id: String,

    /// Wall-clock punch time in the device's local zone
    pub punch_time: NaiveDateTime,

    /// Punch kind code
    pub punch_kind: i32,

    /// Verify method code, NULL when the device did not report one
    pub verify_method: Option<i32>,

    pub work_code: Option<i64>,

    /// Body temperature in celsius, push terminals only
    pub temperature: Option<f64>,

    /// 'push' or 'pull'
    pub provenance: String,

    /// Whether the punch has been handed to the upstream personnel system
    pub linked: bool,

    pub created_at: DateTime<Utc>,
}

impl AttendanceLog {
    pub fn get_punch_kind(&self) -> Option<PunchKind> {
        u8::try_from(self.punch_kind)
            .ok()
            .and_then(|k| PunchKind::from_u8(k).ok())
    }

    pub fn get_verify_method(&self) -> Option<VerifyMethod> {
        self.verify_method
            .and_then(|v| u8::try_from(v).ok())
            .and_then(|v| VerifyMethod::from_u8(v).ok())
    }

    /// Build the insertable fields from a canonical record.
    pub fn from_record(
        device_id: i64,
        record: &PunchRecord,
        provenance: Provenance,
    ) -> NewAttendanceLog {
        NewAttendanceLog {
            device_id,
            user_id: record.user_id.as_str().to_string(),
            punch_time: record.punch_time,
            punch_kind: i32::from(record.kind.to_u8()),
            verify_method: record.verify_method.map(|v| i32::from(v.to_u8())),
            work_code: record.work_code.map(i64::from),
            temperature: record.temperature.map(f64::from),
            provenance: provenance.as_str().to_string(),
        }
    }
}

/// Fields for inserting an attendance row.
#[derive(Debug, Clone)]
pub struct NewAttendanceLog {
    pub device_id: i64,
    pub user_id: String,
    pub punch_time: NaiveDateTime,
    pub punch_kind: i32,
    pub verify_method: Option<i32>,
    pub work_code: Option<i64>,
    pub temperature: Option<f64>,
    pub provenance: String,
}
