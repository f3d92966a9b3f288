use thiserror::Error;

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A lookup that the caller required to succeed came back empty.
    #[error("no {entity} row matching {key}")]
    Missing { entity: String, key: String },

    #[error("invalid database configuration: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Builds the [`StorageError::Missing`] variant from display-able parts.
    pub fn missing(entity: impl Into<String>, key: impl std::fmt::Display) -> Self {
        StorageError::Missing {
            entity: entity.into(),
            key: key.to_string(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
