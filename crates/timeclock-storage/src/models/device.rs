use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use timeclock_core::Transport;

/// A registered timeclock terminal.
///
/// The serial number is the device's stable identity across both transports.
/// Pull devices carry an address and port for polling; push-only devices
/// leave the address NULL and are recognized by serial when they call in.
///
/// `last_seen` is refreshed on every push handshake and every successful
/// pull session, so it doubles as a liveness indicator.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    /// Auto-increment primary key
    pub id: i64,

    /// Device serial number, unique
    pub serial: String,

    /// Human-readable label
    pub name: String,

    /// Poll address for pull devices, NULL for push-only
    pub address: Option<String>,

    /// Poll port for pull devices
    pub port: i64,

    /// Communication key for pull session auth, 0 when unset
    pub comm_key: i64,

    /// Transport discriminant: 0=push, 1=pull, 2=both
    pub transport: i32,

    /// Disabled devices are skipped by scheduled syncs
    pub enabled: bool,

    /// Last contact from or with the device
    pub last_seen: Option<DateTime<Utc>>,

    /// User count as last reported by the device
    pub user_count: i64,

    /// Attendance record count as last reported by the device
    pub record_count: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Convert the stored transport discriminant to the enum.
    pub fn get_transport(&self) -> Option<Transport> {
        transport_from_i32(self.transport)
    }
}

/// Map a stored transport discriminant to the enum.
pub fn transport_from_i32(value: i32) -> Option<Transport> {
    match value {
        0 => Some(Transport::Push),
        1 => Some(Transport::Pull),
        2 => Some(Transport::Both),
        _ => None,
    }
}

/// Map a transport enum to its stored discriminant.
pub fn transport_to_i32(transport: Transport) -> i32 {
    match transport {
        Transport::Push => 0,
        Transport::Pull => 1,
        Transport::Both => 2,
    }
}

/// Fields for registering a new device.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub serial: String,
    pub name: String,
    pub address: Option<String>,
    pub port: u16,
    pub comm_key: u32,
    pub transport: Transport,
}

impl NewDevice {
    /// A push-only device known by serial.
    pub fn push(serial: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            name: name.into(),
            address: None,
            port: timeclock_core::constants::DEFAULT_DEVICE_PORT,
            comm_key: 0,
            transport: Transport::Push,
        }
    }

    /// A pull device polled at the given address.
    pub fn pull(
        serial: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            serial: serial.into(),
            name: name.into(),
            address: Some(address.into()),
            port,
            comm_key: 0,
            transport: Transport::Pull,
        }
    }
}
