use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use timeclock_core::{Privilege, UserRecord};

/// A user as enrolled on a specific device.
///
/// Rows are write-once per (device, user id): a re-import of the same raw
/// record leaves an existing row untouched, including fields an operator
/// has edited since. Device data seeds a row, it never overwrites one.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceUser {
    /// Auto-increment primary key
    pub id: i64,

    /// Owning device
    pub device_id: i64,

    /// Identifier as enrolled on the device
    pub user_id: String,

    pub name: String,

    /// Privilege code as reported by the device
    pub privilege: i32,

    /// Device-side password, empty when unset
    pub password: String,

    /// RFID card number, 0 when unset
    pub card_number: i64,

    pub user_group: i32,

    pub has_fingerprint: bool,
    pub has_face: bool,

    /// Cleared when the person leaves; the row itself is kept for history
    pub active: bool,

    pub created_at: DateTime<Utc>,
}

impl DeviceUser {
    /// Convert the stored privilege code to the enum.
    pub fn get_privilege(&self) -> Option<Privilege> {
        u8::try_from(self.privilege)
            .ok()
            .and_then(|p| Privilege::from_u8(p).ok())
    }

    /// Build the insertable fields from a canonical record.
    pub fn from_record(device_id: i64, record: &UserRecord) -> NewDeviceUser {
        NewDeviceUser {
            device_id,
            user_id: record.user_id.as_str().to_string(),
            name: record.name.clone(),
            privilege: i32::from(record.privilege.to_u8()),
            password: record.password.clone(),
            card_number: i64::from(record.card_number),
            user_group: i32::from(record.group),
            has_fingerprint: record.has_fingerprint,
            has_face: record.has_face,
        }
    }
}

/// Fields for inserting a device user.
#[derive(Debug, Clone)]
pub struct NewDeviceUser {
    pub device_id: i64,
    pub user_id: String,
    pub name: String,
    pub privilege: i32,
    pub password: String,
    pub card_number: i64,
    pub user_group: i32,
    pub has_fingerprint: bool,
    pub has_face: bool,
}
