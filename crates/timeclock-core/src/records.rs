//! Canonical record types shared by both transports.
//!
//! The push codec parses tab-separated text lines and the pull codec parses
//! fixed-size binary records, but both normalize into these structures before
//! anything downstream sees them.

use crate::types::{ExternalUserId, PunchKind, Privilege, VerifyMethod};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A user enrolled on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: ExternalUserId,
    pub name: String,
    pub privilege: Privilege,
    /// Device-side password, empty when unset
    pub password: String,
    /// RFID card number, zero when unset
    pub card_number: u32,
    pub group: u8,
    pub has_fingerprint: bool,
    pub has_face: bool,
}

impl UserRecord {
    /// Minimal record with defaults for everything but the identity fields.
    #[must_use]
    pub fn new(user_id: ExternalUserId, name: String) -> Self {
        UserRecord {
            user_id,
            name,
            privilege: Privilege::User,
            password: String::new(),
            card_number: 0,
            group: 0,
            has_fingerprint: false,
            has_face: false,
        }
    }
}

/// A single clock punch.
///
/// Timestamps are naive by contract: devices report wall-clock time in their
/// own local zone with no offset information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunchRecord {
    pub user_id: ExternalUserId,
    pub punch_time: NaiveDateTime,
    pub kind: PunchKind,
    pub verify_method: Option<VerifyMethod>,
    pub work_code: Option<u32>,
    /// Body temperature in celsius, reported by some push terminals
    pub temperature: Option<f32>,
}

impl PunchRecord {
    #[must_use]
    pub fn new(user_id: ExternalUserId, punch_time: NaiveDateTime, kind: PunchKind) -> Self {
        PunchRecord {
            user_id,
            punch_time,
            kind,
            verify_method: None,
            work_code: None,
            temperature: None,
        }
    }
}

/// Kind of biometric template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateKind {
    Fingerprint,
    Face,
}

impl TemplateKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::Fingerprint => "fingerprint",
            TemplateKind::Face => "face",
        }
    }
}

/// A biometric enrollment fact uploaded by a push device.
///
/// The template data itself is a vendor blob and is never stored; only the
/// fact of the enrollment and the advertised blob size are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub user_id: ExternalUserId,
    pub kind: TemplateKind,
    /// Finger index 0-9 for fingerprints, 0 for faces
    pub index: u8,
    /// Size of the template blob as advertised by the device
    pub size: u32,
}

/// A device operation log entry (admin login, enrollment, settings change).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub op_code: u16,
    pub operator: String,
    pub occurred_at: Option<NaiveDateTime>,
    /// Remaining fields of the line, joined back with tabs
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_record_defaults() {
        let id = ExternalUserId::new("1001").unwrap();
        let user = UserRecord::new(id, "Alice".to_string());
        assert_eq!(user.privilege, Privilege::User);
        assert_eq!(user.card_number, 0);
        assert!(!user.has_fingerprint);
        assert!(!user.has_face);
    }

    #[test]
    fn test_punch_record_defaults() {
        let id = ExternalUserId::new("1001").unwrap();
        let when = chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let punch = PunchRecord::new(id, when, PunchKind::CheckIn);
        assert!(punch.verify_method.is_none());
        assert!(punch.temperature.is_none());
    }
}
