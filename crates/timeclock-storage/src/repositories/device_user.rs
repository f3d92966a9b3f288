#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::{DeviceUser, NewDeviceUser};
use chrono::Utc;
use sqlx::SqlitePool;
use timeclock_core::TemplateKind;

/// Repository trait for DeviceUser entity operations
pub trait DeviceUserRepository: Send + Sync {
    /// Insert a device user unless one already exists for (device, user id).
    ///
    /// Write-once: an existing row is left completely untouched, even when
    /// the incoming record differs. Returns `true` if a row was created.
    async fn insert_if_absent(&self, user: &NewDeviceUser) -> StorageResult<bool>;

    /// Find by the natural key
    async fn find(&self, device_id: i64, user_id: &str) -> StorageResult<Option<DeviceUser>>;

    /// List all users enrolled on a device
    async fn list_by_device(&self, device_id: i64) -> StorageResult<Vec<DeviceUser>>;

    /// Count users enrolled on a device
    async fn count_by_device(&self, device_id: i64) -> StorageResult<i64>;

    /// Overwrite mutable fields, used by operator edits rather than imports
    async fn update_name(&self, device_id: i64, user_id: &str, name: &str) -> StorageResult<()>;

    /// Flip an enrollment flag when the device reports a biometric template.
    ///
    /// Returns `false` when no matching user row exists yet; template posts
    /// can arrive before the user record on some firmware.
    async fn set_enrollment(
        &self,
        device_id: i64,
        user_id: &str,
        kind: TemplateKind,
    ) -> StorageResult<bool>;
}

/// SQLite implementation of DeviceUserRepository
pub struct SqliteDeviceUserRepository {
    pool: SqlitePool,
}

impl SqliteDeviceUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, device_id, user_id, name, privilege, password, card_number, \
                            user_group, has_fingerprint, has_face, active, created_at";

impl DeviceUserRepository for SqliteDeviceUserRepository {
    async fn insert_if_absent(&self, user: &NewDeviceUser) -> StorageResult<bool> {
        // The unique (device_id, user_id) index plus DO NOTHING gives the
        // write-once policy; rows_affected tells create from skip
        let result = sqlx::query(
            r#"
            INSERT INTO device_users (device_id, user_id, name, privilege, password,
                                      card_number, user_group, has_fingerprint,
                                      has_face, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (device_id, user_id) DO NOTHING
            "#,
        )
        .bind(user.device_id)
        .bind(&user.user_id)
        .bind(&user.name)
        .bind(user.privilege)
        .bind(&user.password)
        .bind(user.card_number)
        .bind(user.user_group)
        .bind(user.has_fingerprint)
        .bind(user.has_face)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, device_id: i64, user_id: &str) -> StorageResult<Option<DeviceUser>> {
        let user = sqlx::query_as::<_, DeviceUser>(&format!(
            "SELECT {USER_COLUMNS} FROM device_users WHERE device_id = ? AND user_id = ?"
        ))
        .bind(device_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn list_by_device(&self, device_id: i64) -> StorageResult<Vec<DeviceUser>> {
        let users = sqlx::query_as::<_, DeviceUser>(&format!(
            "SELECT {USER_COLUMNS} FROM device_users WHERE device_id = ? ORDER BY user_id"
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn count_by_device(&self, device_id: i64) -> StorageResult<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM device_users WHERE device_id = ?")
                .bind(device_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }

    async fn update_name(&self, device_id: i64, user_id: &str, name: &str) -> StorageResult<()> {
        sqlx::query("UPDATE device_users SET name = ? WHERE device_id = ? AND user_id = ?")
            .bind(name)
            .bind(device_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_enrollment(
        &self,
        device_id: i64,
        user_id: &str,
        kind: TemplateKind,
    ) -> StorageResult<bool> {
        let column = match kind {
            TemplateKind::Fingerprint => "has_fingerprint",
            TemplateKind::Face => "has_face",
        };
        let result = sqlx::query(&format!(
            "UPDATE device_users SET {column} = 1 WHERE device_id = ? AND user_id = ?"
        ))
        .bind(device_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
