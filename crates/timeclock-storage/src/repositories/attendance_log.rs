#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::{AttendanceLog, NewAttendanceLog};
use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;

/// Repository trait for AttendanceLog entity operations
pub trait AttendanceLogRepository: Send + Sync {
    /// Insert a punch unless its identity tuple already exists.
    ///
    /// The tuple is (device, user id, punch time, punch kind). Returns
    /// `true` if a row was inserted, `false` for a duplicate skip.
    async fn insert_if_absent(&self, log: &NewAttendanceLog) -> StorageResult<bool>;

    /// List punches for a device within a half-open time window
    async fn list_by_device_in_range(
        &self,
        device_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> StorageResult<Vec<AttendanceLog>>;

    /// Count punches stored for a device
    async fn count_by_device(&self, device_id: i64) -> StorageResult<i64>;

    /// Count all stored punches
    async fn count_all(&self) -> StorageResult<i64>;
}

/// SQLite implementation of AttendanceLogRepository
pub struct SqliteAttendanceLogRepository {
    pool: SqlitePool,
}

impl SqliteAttendanceLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const LOG_COLUMNS: &str = "id, device_id, user_id, punch_time, punch_kind, verify_method, \
                           work_code, temperature, provenance, linked, created_at";

impl AttendanceLogRepository for SqliteAttendanceLogRepository {
    async fn insert_if_absent(&self, log: &NewAttendanceLog) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_logs (device_id, user_id, punch_time, punch_kind,
                                         verify_method, work_code, temperature,
                                         provenance, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (device_id, user_id, punch_time, punch_kind) DO NOTHING
            "#,
        )
        .bind(log.device_id)
        .bind(&log.user_id)
        .bind(log.punch_time)
        .bind(log.punch_kind)
        .bind(log.verify_method)
        .bind(log.work_code)
        .bind(log.temperature)
        .bind(&log.provenance)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_device_in_range(
        &self,
        device_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> StorageResult<Vec<AttendanceLog>> {
        let logs = sqlx::query_as::<_, AttendanceLog>(&format!(
            r#"
            SELECT {LOG_COLUMNS}
            FROM attendance_logs
            WHERE device_id = ? AND punch_time >= ? AND punch_time < ?
            ORDER BY punch_time
            "#
        ))
        .bind(device_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    async fn count_by_device(&self, device_id: i64) -> StorageResult<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM attendance_logs WHERE device_id = ?")
                .bind(device_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }

    async fn count_all(&self) -> StorageResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attendance_logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
