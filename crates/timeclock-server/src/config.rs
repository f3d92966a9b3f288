//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use timeclock_core::constants::{
    DEFAULT_COMMAND_STALE_SECS, DEFAULT_LEASE_HOLD_SECS, DEFAULT_SESSION_TIMEOUT_MS,
};
use timeclock_core::{Error, Result};

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_DATABASE_PATH: &str = "timeclock.db";

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the push HTTP listener binds to
    pub bind: SocketAddr,

    /// SQLite database path
    pub database_path: String,

    /// Timeout for every pull-session I/O operation
    pub session_timeout: Duration,

    /// How long a device lease is honored before it can be reclaimed
    pub lease_hold: Duration,

    /// Age after which an unacknowledged command is reported as stale
    pub command_stale: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // The fallback literal parses; unreachable otherwise
            bind: DEFAULT_BIND.parse().unwrap_or(SocketAddr::from(([0, 0, 0, 0], 8080))),
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            session_timeout: Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS),
            lease_hold: Duration::from_secs(DEFAULT_LEASE_HOLD_SECS),
            command_stale: Duration::from_secs(DEFAULT_COMMAND_STALE_SECS),
        }
    }
}

impl ServerConfig {
    /// Read configuration from `TIMECLOCK_*` environment variables,
    /// falling back to defaults for anything unset.
    ///
    /// # Errors
    /// Returns `Error::Config` when a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("TIMECLOCK_BIND") {
            config.bind = raw
                .parse()
                .map_err(|_| Error::Config(format!("Invalid TIMECLOCK_BIND: {raw}")))?;
        }
        if let Ok(raw) = std::env::var("TIMECLOCK_DB") {
            config.database_path = raw;
        }
        if let Ok(raw) = std::env::var("TIMECLOCK_SESSION_TIMEOUT_MS") {
            config.session_timeout = Duration::from_millis(parse_u64(&raw, "TIMECLOCK_SESSION_TIMEOUT_MS")?);
        }
        if let Ok(raw) = std::env::var("TIMECLOCK_LEASE_HOLD_SECS") {
            config.lease_hold = Duration::from_secs(parse_u64(&raw, "TIMECLOCK_LEASE_HOLD_SECS")?);
        }
        if let Ok(raw) = std::env::var("TIMECLOCK_COMMAND_STALE_SECS") {
            config.command_stale = Duration::from_secs(parse_u64(&raw, "TIMECLOCK_COMMAND_STALE_SECS")?);
        }

        Ok(config)
    }
}

fn parse_u64(raw: &str, name: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| Error::Config(format!("Invalid {name}: {raw}")))
}
