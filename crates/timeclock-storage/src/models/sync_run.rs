use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a pull session was doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOperation {
    FetchUsers,
    FetchAttendance,
}

impl SyncOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncOperation::FetchUsers => "fetch_users",
            SyncOperation::FetchAttendance => "fetch_attendance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fetch_users" => Some(SyncOperation::FetchUsers),
            "fetch_attendance" => Some(SyncOperation::FetchAttendance),
            _ => None,
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a pull session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Succeeded => "succeeded",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "running" => Some(SyncStatus::Running),
            "succeeded" => Some(SyncStatus::Succeeded),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

/// Audit record of one pull-direction sync.
///
/// Only pull sessions create runs; the push path is device-initiated and
/// leaves its trace in the data tables alone.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncRun {
    /// Auto-increment primary key
    pub id: i64,

    pub device_id: i64,

    /// See [`SyncOperation`]
    pub operation: String,

    /// See [`SyncStatus`]
    pub status: String,

    /// Reporting window applied to the fetched records, if any
    pub range_start: Option<NaiveDateTime>,
    pub range_end: Option<NaiveDateTime>,

    /// Record counts from the import engine
    pub total: i64,
    pub imported: i64,
    pub skipped: i64,
    pub failed: i64,

    /// JSON array of per-record failure messages
    pub errors: String,

    /// Failure detail when status is 'failed'
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    pub fn get_status(&self) -> Option<SyncStatus> {
        SyncStatus::parse(&self.status)
    }

    pub fn get_operation(&self) -> Option<SyncOperation> {
        SyncOperation::parse(&self.operation)
    }

    /// The per-record failure messages collected during the run.
    pub fn error_list(&self) -> Vec<String> {
        serde_json::from_str(&self.errors).unwrap_or_default()
    }
}
