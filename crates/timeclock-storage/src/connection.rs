use crate::error::{StorageError, StorageResult};
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Settings for opening the SQLite pool.
///
/// The defaults suit a single server process fronting a handful of devices;
/// builder methods override individual knobs.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Filesystem path of the database file.
    pub path: String,
    /// Upper bound on pooled connections.
    pub pool_size: u32,
    /// How long to wait on a locked database before giving up.
    pub busy_timeout: Duration,
    /// Create the file on first open.
    pub create_missing: bool,
    /// Apply pending migrations as part of opening the pool.
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "timeclock.db".to_string(),
            pool_size: 8,
            busy_timeout: Duration::from_secs(10),
            create_missing: true,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    pub fn create_missing(mut self, create: bool) -> Self {
        self.create_missing = create;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

/// Shared handle to the SQLite pool.
///
/// Cloning is cheap; all clones refer to the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool described by `config`, creating parent directories
    /// and running migrations as configured.
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        if let Some(dir) = Path::new(&config.path).parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            std::fs::create_dir_all(dir).map_err(|e| {
                StorageError::Configuration(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path))
            .map_err(|e| StorageError::Configuration(format!("bad database path: {}", e)))?
            .create_if_missing(config.create_missing)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        if config.run_migrations {
            db.migrate().await?;
        }
        Ok(db)
    }

    /// Opens a fresh in-memory database with the schema applied.
    ///
    /// The pool is pinned to one connection; each SQLite `:memory:`
    /// connection is its own independent database.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Applies any migrations not yet recorded in `_sqlx_migrations`.
    /// The migration files are embedded at compile time.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
