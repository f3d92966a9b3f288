use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Link from a device-side user id to a personnel record.
///
/// Created at most once per external id during user import when linking is
/// requested; the unique constraint makes repeated imports idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersonnelLink {
    /// Auto-increment primary key
    pub id: i64,

    /// Device-side user id, unique across all devices
    pub user_id: String,

    /// Name captured from the first device record that introduced the id
    pub display_name: String,

    pub created_at: DateTime<Utc>,
}
