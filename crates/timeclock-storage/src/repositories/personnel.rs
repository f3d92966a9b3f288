#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::PersonnelLink;
use chrono::Utc;
use sqlx::SqlitePool;

/// Repository trait for PersonnelLink operations
pub trait PersonnelRepository: Send + Sync {
    /// Create a link unless one already exists for the external user id.
    /// Returns `true` if a link was created.
    async fn link_if_absent(&self, user_id: &str, display_name: &str) -> StorageResult<bool>;

    /// Find the link for an external user id
    async fn find_by_user_id(&self, user_id: &str) -> StorageResult<Option<PersonnelLink>>;

    /// Count all links
    async fn count(&self) -> StorageResult<i64>;
}

/// SQLite implementation of PersonnelRepository
pub struct SqlitePersonnelRepository {
    pool: SqlitePool,
}

impl SqlitePersonnelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl PersonnelRepository for SqlitePersonnelRepository {
    async fn link_if_absent(&self, user_id: &str, display_name: &str) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO personnel_links (user_id, display_name, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(display_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_user_id(&self, user_id: &str) -> StorageResult<Option<PersonnelLink>> {
        let link = sqlx::query_as::<_, PersonnelLink>(
            "SELECT id, user_id, display_name, created_at FROM personnel_links WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(link)
    }

    async fn count(&self) -> StorageResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM personnel_links")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
