use crate::{
    Result,
    constants::{MAX_SERIAL_LENGTH, MAX_USER_ID_LENGTH, MIN_SERIAL_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Device serial number (1-50 ASCII characters, no whitespace)
///
/// The serial is the device's stable identity across both transports: push
/// devices report it in the `SN` query parameter, pull devices are matched
/// to it by their configured address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceSerial(String);

impl DeviceSerial {
    /// Create a new device serial with validation.
    ///
    /// The serial is trimmed before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidSerial` if:
    /// - The serial length is not between 1-50 characters after trimming
    /// - The serial contains non-ASCII or whitespace characters
    pub fn new(serial: &str) -> Result<Self> {
        let serial = serial.trim();

        let len = serial.len();
        if !(MIN_SERIAL_LENGTH..=MAX_SERIAL_LENGTH).contains(&len) {
            return Err(Error::InvalidSerial(format!(
                "Serial must be {MIN_SERIAL_LENGTH}-{MAX_SERIAL_LENGTH} chars, got {len}"
            )));
        }

        if !serial.is_ascii() || serial.chars().any(char::is_whitespace) {
            return Err(Error::InvalidSerial(
                "Serial must be ASCII without whitespace".to_string(),
            ));
        }

        Ok(DeviceSerial(serial.to_string()))
    }

    /// Get the serial as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceSerial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceSerial {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceSerial::new(s)
    }
}

/// User identifier as enrolled on the device (1-24 ASCII characters)
///
/// Devices store this as a fixed-width field, so the maximum length matches
/// the on-wire record layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalUserId(String);

impl ExternalUserId {
    /// Create a new external user id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidUserId` if the id is empty after trimming,
    /// longer than 24 characters, or contains non-ASCII characters.
    pub fn new(id: &str) -> Result<Self> {
        let id = id.trim();

        if id.is_empty() || id.len() > MAX_USER_ID_LENGTH {
            return Err(Error::InvalidUserId(format!(
                "User id must be 1-{MAX_USER_ID_LENGTH} chars, got {}",
                id.len()
            )));
        }

        if !id.is_ascii() {
            return Err(Error::InvalidUserId("User id must be ASCII".to_string()));
        }

        Ok(ExternalUserId(id.to_string()))
    }

    /// Get the user id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalUserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ExternalUserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ExternalUserId::new(s)
    }
}

/// Device communication key used to authenticate pull sessions
///
/// # Security
/// This type implements constant-time comparison to prevent timing attacks
/// when checking the key during session authentication.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct CommKey(u32);

impl CommKey {
    /// Create a communication key. Zero means the device requires no auth.
    #[must_use]
    pub fn new(key: u32) -> Self {
        CommKey(key)
    }

    /// Get the raw key value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the device requires no authentication.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Constant-time comparison implementation for CommKey
impl PartialEq for CommKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_le_bytes().ct_eq(&other.0.to_le_bytes()).into()
    }
}

impl std::hash::Hash for CommKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Kind of punch recorded at the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PunchKind {
    CheckIn = 0,
    CheckOut = 1,
    BreakOut = 2,
    BreakIn = 3,
    OvertimeIn = 4,
    OvertimeOut = 5,
    /// Device did not report a punch kind
    Unspecified = 255,
}

impl PunchKind {
    /// Create a punch kind from a u8 value.
    ///
    /// # Errors
    /// Returns `Error::InvalidPunchKind` if the value is not a recognized code.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PunchKind::CheckIn),
            1 => Ok(PunchKind::CheckOut),
            2 => Ok(PunchKind::BreakOut),
            3 => Ok(PunchKind::BreakIn),
            4 => Ok(PunchKind::OvertimeIn),
            5 => Ok(PunchKind::OvertimeOut),
            255 => Ok(PunchKind::Unspecified),
            _ => Err(Error::InvalidPunchKind { code: value }),
        }
    }

    /// Convert the punch kind to its u8 code.
    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PunchKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PunchKind::CheckIn => write!(f, "Check-in"),
            PunchKind::CheckOut => write!(f, "Check-out"),
            PunchKind::BreakOut => write!(f, "Break-out"),
            PunchKind::BreakIn => write!(f, "Break-in"),
            PunchKind::OvertimeIn => write!(f, "Overtime-in"),
            PunchKind::OvertimeOut => write!(f, "Overtime-out"),
            PunchKind::Unspecified => write!(f, "Unspecified"),
        }
    }
}

/// Method the device used to verify the person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum VerifyMethod {
    Password = 0,
    Fingerprint = 1,
    Card = 2,
    Face = 15,
}

impl VerifyMethod {
    /// Create a verify method from a u8 value.
    ///
    /// # Errors
    /// Returns `Error::InvalidVerifyMethod` if the value is not a recognized code.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(VerifyMethod::Password),
            1 => Ok(VerifyMethod::Fingerprint),
            2 => Ok(VerifyMethod::Card),
            15 => Ok(VerifyMethod::Face),
            _ => Err(Error::InvalidVerifyMethod { code: value }),
        }
    }

    /// Convert the verify method to its u8 code.
    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for VerifyMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VerifyMethod::Password => write!(f, "Password"),
            VerifyMethod::Fingerprint => write!(f, "Fingerprint"),
            VerifyMethod::Card => write!(f, "Card"),
            VerifyMethod::Face => write!(f, "Face"),
        }
    }
}

/// Privilege level of a user enrolled on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Privilege {
    User = 0,
    Enroller = 2,
    Admin = 6,
    SuperAdmin = 14,
}

impl Privilege {
    /// Create a privilege from a u8 value.
    ///
    /// # Errors
    /// Returns `Error::InvalidPrivilege` if the value is not a recognized code.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Privilege::User),
            2 => Ok(Privilege::Enroller),
            6 => Ok(Privilege::Admin),
            14 => Ok(Privilege::SuperAdmin),
            _ => Err(Error::InvalidPrivilege { code: value }),
        }
    }

    /// Convert the privilege to its u8 code.
    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` if the user can administer the device.
    #[inline]
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Privilege::Admin | Privilege::SuperAdmin)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Privilege::User => write!(f, "User"),
            Privilege::Enroller => write!(f, "Enroller"),
            Privilege::Admin => write!(f, "Admin"),
            Privilege::SuperAdmin => write!(f, "Super admin"),
        }
    }
}

/// Which transports a device speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    /// Device posts data to the HTTP endpoint on its own schedule
    Push,
    /// Server opens a TCP session and polls the device
    Pull,
    /// Device supports both transports
    Both,
}

impl Transport {
    /// Returns `true` if the device can be polled over TCP.
    #[inline]
    #[must_use]
    pub fn supports_pull(self) -> bool {
        matches!(self, Transport::Pull | Transport::Both)
    }

    /// Returns `true` if the device may post data over HTTP.
    #[inline]
    #[must_use]
    pub fn supports_push(self) -> bool {
        matches!(self, Transport::Push | Transport::Both)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transport::Push => write!(f, "push"),
            Transport::Pull => write!(f, "pull"),
            Transport::Both => write!(f, "both"),
        }
    }
}

/// Which transport a stored record arrived through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Push,
    Pull,
}

impl Provenance {
    /// The stable string used in storage and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Push => "push",
            Provenance::Pull => "pull",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("A1B2C3", "A1B2C3")]
    #[case("  CJXU201560042  ", "CJXU201560042")]
    #[case("X", "X")]
    fn test_device_serial_valid(#[case] input: &str, #[case] expected: &str) {
        let serial = DeviceSerial::new(input).unwrap();
        assert_eq!(serial.as_str(), expected);
    }

    #[rstest]
    #[case("")] // empty
    #[case("   ")] // whitespace only
    #[case("AB CD")] // interior whitespace
    fn test_device_serial_invalid(#[case] input: &str) {
        assert!(DeviceSerial::new(input).is_err());
    }

    #[test]
    fn test_device_serial_too_long() {
        let long = "X".repeat(51);
        assert!(DeviceSerial::new(&long).is_err());
    }

    #[rstest]
    #[case("1001")]
    #[case("emp-42")]
    #[case("123456789012345678901234")] // exactly 24
    fn test_external_user_id_valid(#[case] input: &str) {
        assert!(ExternalUserId::new(input).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("1234567890123456789012345")] // 25 chars
    fn test_external_user_id_invalid(#[case] input: &str) {
        assert!(ExternalUserId::new(input).is_err());
    }

    #[test]
    fn test_comm_key() {
        let key = CommKey::new(1234);
        assert_eq!(key.value(), 1234);
        assert!(!key.is_empty());
        assert_eq!(key, CommKey::new(1234));
        assert_ne!(key, CommKey::new(1235));
        assert!(CommKey::new(0).is_empty());
    }

    #[rstest]
    #[case(0, PunchKind::CheckIn)]
    #[case(1, PunchKind::CheckOut)]
    #[case(2, PunchKind::BreakOut)]
    #[case(3, PunchKind::BreakIn)]
    #[case(4, PunchKind::OvertimeIn)]
    #[case(5, PunchKind::OvertimeOut)]
    #[case(255, PunchKind::Unspecified)]
    fn test_punch_kind_roundtrip(#[case] code: u8, #[case] expected: PunchKind) {
        assert_eq!(PunchKind::from_u8(code).unwrap(), expected);
        assert_eq!(expected.to_u8(), code);
    }

    #[test]
    fn test_punch_kind_invalid() {
        assert!(PunchKind::from_u8(6).is_err());
        assert!(PunchKind::from_u8(100).is_err());
    }

    #[test]
    fn test_verify_method() {
        assert_eq!(VerifyMethod::from_u8(1).unwrap(), VerifyMethod::Fingerprint);
        assert_eq!(VerifyMethod::from_u8(15).unwrap(), VerifyMethod::Face);
        assert!(VerifyMethod::from_u8(3).is_err());
    }

    #[test]
    fn test_privilege() {
        assert_eq!(Privilege::from_u8(0).unwrap(), Privilege::User);
        assert_eq!(Privilege::from_u8(14).unwrap(), Privilege::SuperAdmin);
        assert!(Privilege::from_u8(1).is_err());
        assert!(Privilege::SuperAdmin.is_admin());
        assert!(!Privilege::User.is_admin());
    }

    #[test]
    fn test_transport() {
        assert!(Transport::Both.supports_pull());
        assert!(Transport::Both.supports_push());
        assert!(!Transport::Push.supports_pull());
        assert!(!Transport::Pull.supports_push());
    }
}
