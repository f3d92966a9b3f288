#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::{SyncOperation, SyncRun};
use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;

/// Final counts and per-record failure messages reported when a run
/// completes.
#[derive(Debug, Clone, Default)]
pub struct RunCounts {
    pub total: i64,
    pub imported: i64,
    pub skipped: i64,
    pub failed: i64,
    pub errors: Vec<String>,
}

/// Repository trait for SyncRun audit records.
///
/// Runs move through `pending -> running -> succeeded | failed`. The state
/// transitions are guarded in SQL, so a run that already reached a terminal
/// state can never be rewritten by a late caller.
pub trait SyncRunRepository: Send + Sync {
    /// Open a run in state pending
    async fn create(
        &self,
        device_id: i64,
        operation: SyncOperation,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> StorageResult<i64>;

    /// Advance pending to running; false when the run is not pending
    async fn mark_running(&self, run_id: i64) -> StorageResult<bool>;

    /// Close a running run as succeeded with its counts and error list;
    /// false when the run is not running
    async fn complete(&self, run_id: i64, counts: &RunCounts) -> StorageResult<bool>;

    /// Close a non-terminal run as failed with the error detail; false when
    /// the run already reached a terminal state
    async fn fail(&self, run_id: i64, error: &str) -> StorageResult<bool>;

    /// Find by primary key
    async fn find_by_id(&self, run_id: i64) -> StorageResult<Option<SyncRun>>;

    /// Recent runs for one device, newest first
    async fn list_by_device(&self, device_id: i64, limit: i64) -> StorageResult<Vec<SyncRun>>;

    /// Recent runs across all devices, newest first
    async fn list_recent(&self, limit: i64) -> StorageResult<Vec<SyncRun>>;
}

/// SQLite implementation of SyncRunRepository
pub struct SqliteSyncRunRepository {
    pool: SqlitePool,
}

impl SqliteSyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const RUN_COLUMNS: &str = "id, device_id, operation, status, range_start, range_end, \
                           total, imported, skipped, failed, errors, error, \
                           started_at, finished_at";

impl SyncRunRepository for SqliteSyncRunRepository {
    async fn create(
        &self,
        device_id: i64,
        operation: SyncOperation,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> StorageResult<i64> {
        let (range_start, range_end) = match range {
            Some((s, e)) => (Some(s), Some(e)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO sync_runs (device_id, operation, status, range_start,
                                   range_end, started_at)
            VALUES (?, ?, 'pending', ?, ?, ?)
            "#,
        )
        .bind(device_id)
        .bind(operation.as_str())
        .bind(range_start)
        .bind(range_end)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn mark_running(&self, run_id: i64) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE sync_runs SET status = 'running' WHERE id = ? AND status = 'pending'",
        )
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, run_id: i64, counts: &RunCounts) -> StorageResult<bool> {
        let errors = serde_json::to_string(&counts.errors).unwrap_or_else(|_| "[]".to_string());
        let result = sqlx::query(
            r#"
            UPDATE sync_runs
            SET status = 'succeeded', total = ?, imported = ?, skipped = ?,
                failed = ?, errors = ?, finished_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(counts.total)
        .bind(counts.imported)
        .bind(counts.skipped)
        .bind(counts.failed)
        .bind(errors)
        .bind(Utc::now())
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail(&self, run_id: i64, error: &str) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs
            SET status = 'failed', error = ?, finished_at = ?
            WHERE id = ? AND status IN ('pending', 'running')
            "#,
        )
        .bind(error)
        .bind(Utc::now())
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, run_id: i64) -> StorageResult<Option<SyncRun>> {
        let run = sqlx::query_as::<_, SyncRun>(&format!(
            "SELECT {RUN_COLUMNS} FROM sync_runs WHERE id = ?"
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(run)
    }

    async fn list_by_device(&self, device_id: i64, limit: i64) -> StorageResult<Vec<SyncRun>> {
        let runs = sqlx::query_as::<_, SyncRun>(&format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM sync_runs
            WHERE device_id = ?
            ORDER BY started_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }

    async fn list_recent(&self, limit: i64) -> StorageResult<Vec<SyncRun>> {
        let runs = sqlx::query_as::<_, SyncRun>(&format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM sync_runs
            ORDER BY started_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }
}
