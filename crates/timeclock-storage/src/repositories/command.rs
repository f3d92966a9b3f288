#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::{Command, CommandKind};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Repository trait for the per-device command queue
///
/// Commands move `pending -> delivered` through [`drain`] (whole queue, push
/// handshake) or [`deliver`] (one row, synchronous pull execution). Both
/// claim atomically, so concurrent callers can never deliver the same
/// command twice.
///
/// [`drain`]: CommandRepository::drain
/// [`deliver`]: CommandRepository::deliver
pub trait CommandRepository: Send + Sync {
    /// Append a command in state pending
    async fn enqueue(
        &self,
        device_id: i64,
        kind: CommandKind,
        payload: &str,
    ) -> StorageResult<i64>;

    /// Claim every pending command for a device, flipping it to delivered.
    ///
    /// Returns the claimed commands in FIFO order. Safe under concurrent
    /// drains: at most one caller wins each command, the loser sees an
    /// empty result for already-claimed rows.
    async fn drain(&self, device_id: i64) -> StorageResult<Vec<Command>>;

    /// Claim one specific pending command, flipping it to delivered.
    ///
    /// Used by the synchronous pull path, which executes exactly the
    /// command it just enqueued and must not touch other pending rows.
    async fn deliver(&self, command_id: i64) -> StorageResult<bool>;

    /// Transition delivered -> acknowledged. Idempotent: acknowledging a
    /// command that is already acknowledged is a no-op returning `false`.
    async fn acknowledge(&self, command_id: i64, result_code: i64) -> StorageResult<bool>;

    /// Mark a command failed, used when a synchronous execution errors
    async fn mark_failed(&self, command_id: i64) -> StorageResult<()>;

    /// Find by primary key
    async fn find_by_id(&self, command_id: i64) -> StorageResult<Option<Command>>;

    /// Commands created before the cutoff that never reached acknowledged
    async fn list_stale(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Command>>;
}

/// SQLite implementation of CommandRepository
pub struct SqliteCommandRepository {
    pool: SqlitePool,
}

impl SqliteCommandRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const COMMAND_COLUMNS: &str = "id, device_id, kind, payload, state, result_code, \
                               created_at, delivered_at, acknowledged_at";

impl CommandRepository for SqliteCommandRepository {
    async fn enqueue(
        &self,
        device_id: i64,
        kind: CommandKind,
        payload: &str,
    ) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO commands (device_id, kind, payload, state, created_at)
            VALUES (?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(device_id)
        .bind(kind.verb())
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn drain(&self, device_id: i64) -> StorageResult<Vec<Command>> {
        // Single UPDATE..RETURNING claims and reads in one statement, so a
        // concurrent drain cannot observe the same rows as pending
        let commands = sqlx::query_as::<_, Command>(&format!(
            r#"
            UPDATE commands
            SET state = 'delivered', delivered_at = ?
            WHERE device_id = ? AND state = 'pending'
            RETURNING {COMMAND_COLUMNS}
            "#
        ))
        .bind(Utc::now())
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;

        let mut commands = commands;
        commands.sort_by_key(|c| c.id);
        Ok(commands)
    }

    async fn deliver(&self, command_id: i64) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET state = 'delivered', delivered_at = ?
            WHERE id = ? AND state = 'pending'
            "#,
        )
        .bind(Utc::now())
        .bind(command_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn acknowledge(&self, command_id: i64, result_code: i64) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET state = 'acknowledged', result_code = ?, acknowledged_at = ?
            WHERE id = ? AND state = 'delivered'
            "#,
        )
        .bind(result_code)
        .bind(Utc::now())
        .bind(command_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, command_id: i64) -> StorageResult<()> {
        sqlx::query("UPDATE commands SET state = 'failed' WHERE id = ?")
            .bind(command_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_by_id(&self, command_id: i64) -> StorageResult<Option<Command>> {
        let command = sqlx::query_as::<_, Command>(&format!(
            "SELECT {COMMAND_COLUMNS} FROM commands WHERE id = ?"
        ))
        .bind(command_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(command)
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Command>> {
        let commands = sqlx::query_as::<_, Command>(&format!(
            r#"
            SELECT {COMMAND_COLUMNS}
            FROM commands
            WHERE state IN ('pending', 'delivered') AND created_at < ?
            ORDER BY created_at
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(commands)
    }
}
