//! Import engine for records arriving from devices, push or pull alike.
//!
//! All entry points are idempotent under replay: attendance rows deduplicate
//! on their natural key, user rows are write-once, personnel links are
//! created at most once. A bad record is counted and kept as an error
//! string; it never aborts the rest of the batch.

use timeclock_core::{DateRange, Provenance, PunchRecord, Result, TemplateRecord, UserRecord};
use tracing::{debug, warn};

use timeclock_storage::repositories::{
    AttendanceLogRepository, DeviceUserRepository, PersonnelRepository,
    SqliteAttendanceLogRepository, SqliteDeviceUserRepository, SqlitePersonnelRepository,
};
use timeclock_storage::{AttendanceLog, Database, DeviceUser, StorageResult};

/// Outcome of a user import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserImportSummary {
    pub total: u64,
    pub created: u64,
    pub skipped: u64,
    pub linked: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

/// Outcome of an attendance import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceImportSummary {
    pub total: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

/// Writes device records into storage with dedup and failure accounting.
pub struct ImportEngine {
    users: SqliteDeviceUserRepository,
    logs: SqliteAttendanceLogRepository,
    personnel: SqlitePersonnelRepository,
}

impl ImportEngine {
    #[must_use]
    pub fn new(db: &Database) -> Self {
        Self {
            users: SqliteDeviceUserRepository::new(db.pool().clone()),
            logs: SqliteAttendanceLogRepository::new(db.pool().clone()),
            personnel: SqlitePersonnelRepository::new(db.pool().clone()),
        }
    }

    /// Import user records for a device.
    ///
    /// Existing rows are never overwritten. With `link_to_personnel`, each
    /// newly created user also gets a personnel link keyed by the external
    /// user id, unless one already exists.
    ///
    /// # Errors
    /// Fails only on a storage error; decode failures are summarized.
    pub async fn import_users(
        &self,
        device_id: i64,
        records: impl IntoIterator<Item = Result<UserRecord>>,
        link_to_personnel: bool,
    ) -> StorageResult<UserImportSummary> {
        let mut summary = UserImportSummary::default();

        for record in records {
            summary.total += 1;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(device_id, "Rejected user record: {}", e);
                    summary.failed += 1;
                    summary.errors.push(e.to_string());
                    continue;
                }
            };

            let created = self
                .users
                .insert_if_absent(&DeviceUser::from_record(device_id, &record))
                .await?;
            if created {
                summary.created += 1;
            } else {
                summary.skipped += 1;
            }

            if link_to_personnel
                && self
                    .personnel
                    .link_if_absent(record.user_id.as_str(), &record.name)
                    .await?
            {
                summary.linked += 1;
            }
        }

        debug!(
            device_id,
            total = summary.total,
            created = summary.created,
            skipped = summary.skipped,
            failed = summary.failed,
            "User import finished"
        );
        Ok(summary)
    }

    /// Import attendance records for a device.
    ///
    /// Punches outside `range` are skipped without touching storage; the
    /// pull protocol always returns the device's whole log. A replay of the
    /// same batch inserts nothing and still succeeds.
    ///
    /// # Errors
    /// Fails only on a storage error; decode failures are summarized.
    pub async fn import_attendance(
        &self,
        device_id: i64,
        records: impl IntoIterator<Item = Result<PunchRecord>>,
        provenance: Provenance,
        range: Option<&DateRange>,
    ) -> StorageResult<AttendanceImportSummary> {
        let mut summary = AttendanceImportSummary::default();

        for record in records {
            summary.total += 1;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(device_id, "Rejected punch record: {}", e);
                    summary.failed += 1;
                    summary.errors.push(e.to_string());
                    continue;
                }
            };

            if let Some(range) = range {
                if !range.contains(record.punch_time) {
                    summary.skipped += 1;
                    continue;
                }
            }

            let inserted = self
                .logs
                .insert_if_absent(&AttendanceLog::from_record(device_id, &record, provenance))
                .await?;
            if inserted {
                summary.inserted += 1;
            } else {
                summary.skipped += 1;
            }
        }

        debug!(
            device_id,
            total = summary.total,
            inserted = summary.inserted,
            skipped = summary.skipped,
            failed = summary.failed,
            "Attendance import finished"
        );
        Ok(summary)
    }

    /// Record biometric enrollment facts reported by the device.
    ///
    /// Only the flag is stored, never the template payload. Returns how many
    /// flags were actually set; a template for an unknown user is logged and
    /// skipped, since the user line may simply not have arrived yet.
    pub async fn apply_templates(
        &self,
        device_id: i64,
        templates: &[TemplateRecord],
    ) -> StorageResult<u64> {
        let mut applied = 0;
        for template in templates {
            let updated = self
                .users
                .set_enrollment(device_id, template.user_id.as_str(), template.kind)
                .await?;
            if updated {
                applied += 1;
            } else {
                warn!(
                    device_id,
                    user_id = template.user_id.as_str(),
                    "Template for unknown user ignored"
                );
            }
        }
        Ok(applied)
    }
}
