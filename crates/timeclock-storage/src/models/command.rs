use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a queued command.
///
/// `pending -> delivered` happens only through the atomic drain;
/// `delivered -> acknowledged` happens when the device reports the result.
/// `failed` is terminal and set when a synchronous (pull) execution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandState {
    Pending,
    Delivered,
    Acknowledged,
    Failed,
}

impl CommandState {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandState::Pending => "pending",
            CommandState::Delivered => "delivered",
            CommandState::Acknowledged => "acknowledged",
            CommandState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommandState::Pending),
            "delivered" => Some(CommandState::Delivered),
            "acknowledged" => Some(CommandState::Acknowledged),
            "failed" => Some(CommandState::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Instruction kinds a device understands.
///
/// The stored form doubles as the verb serialized to push devices in
/// handshake replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Reboot,
    SetTime,
    ClearLog,
    QueryUserInfo,
    QueryAttLog,
}

impl CommandKind {
    pub fn verb(self) -> &'static str {
        match self {
            CommandKind::Reboot => "REBOOT",
            CommandKind::SetTime => "SET TIME",
            CommandKind::ClearLog => "CLEAR LOG",
            CommandKind::QueryUserInfo => "QUERY USERINFO",
            CommandKind::QueryAttLog => "QUERY ATTLOG",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REBOOT" => Some(CommandKind::Reboot),
            "SET TIME" => Some(CommandKind::SetTime),
            "CLEAR LOG" => Some(CommandKind::ClearLog),
            "QUERY USERINFO" => Some(CommandKind::QueryUserInfo),
            "QUERY ATTLOG" => Some(CommandKind::QueryAttLog),
            _ => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.verb())
    }
}

/// A queued device instruction.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Command {
    /// Auto-increment primary key
    pub id: i64,

    pub device_id: i64,

    /// Command verb, see [`CommandKind`]
    pub kind: String,

    /// Optional argument, command-specific
    pub payload: String,

    /// Lifecycle state, see [`CommandState`]
    pub state: String,

    /// Result code reported by the device, 0 means success
    pub result_code: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Command {
    pub fn get_state(&self) -> Option<CommandState> {
        CommandState::parse(&self.state)
    }

    pub fn get_kind(&self) -> Option<CommandKind> {
        CommandKind::parse(&self.kind)
    }

    /// A command still undelivered or unacknowledged past the cutoff.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        matches!(
            self.get_state(),
            Some(CommandState::Pending | CommandState::Delivered)
        ) && self.created_at < cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [
            CommandState::Pending,
            CommandState::Delivered,
            CommandState::Acknowledged,
            CommandState::Failed,
        ] {
            assert_eq!(CommandState::parse(state.as_str()), Some(state));
        }
        assert_eq!(CommandState::parse("done"), None);
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            CommandKind::Reboot,
            CommandKind::SetTime,
            CommandKind::ClearLog,
            CommandKind::QueryUserInfo,
            CommandKind::QueryAttLog,
        ] {
            assert_eq!(CommandKind::parse(kind.verb()), Some(kind));
        }
        assert_eq!(CommandKind::parse("FORMAT"), None);
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let old = Command {
            id: 1,
            device_id: 1,
            kind: "REBOOT".to_string(),
            payload: String::new(),
            state: "delivered".to_string(),
            result_code: None,
            created_at: now - chrono::Duration::hours(25),
            delivered_at: Some(now - chrono::Duration::hours(25)),
            acknowledged_at: None,
        };
        let cutoff = now - chrono::Duration::hours(24);
        assert!(old.is_stale(cutoff));

        let acked = Command {
            state: "acknowledged".to_string(),
            ..old.clone()
        };
        assert!(!acked.is_stale(cutoff));
    }
}
