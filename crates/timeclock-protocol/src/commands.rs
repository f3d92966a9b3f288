//! Command codes for the pull (TCP) protocol.

use timeclock_core::{Error, Result};

/// Command or reply code carried in a pull-protocol frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandCode {
    /// Open a session
    Connect = 1000,
    /// Close the session
    Exit = 1001,
    /// Reboot the device
    Restart = 1004,
    /// Authenticate with the communication key
    Auth = 1102,
    /// Read the device clock
    GetTime = 201,
    /// Set the device clock
    SetTime = 202,
    /// Erase stored attendance records
    ClearAttLog = 15,
    /// Request the enrolled user table
    ReadUsers = 9,
    /// Request stored attendance records
    ReadAttLog = 13,
    /// Request record counts and free capacity
    GetFreeSizes = 50,
    /// Success acknowledgment
    AckOk = 2000,
    /// Failure acknowledgment
    AckError = 2001,
    /// Session is not authenticated
    AckUnauth = 2005,
    /// Announces a bulk transfer and its total size
    PrepareData = 1500,
    /// One chunk of a bulk transfer
    Data = 1501,
    /// Bulk transfer complete, buffers may be released
    FreeData = 1502,
}

impl CommandCode {
    /// Create a command code from its wire value.
    ///
    /// # Errors
    /// Returns `Error::Protocol` for an unrecognized code, which on the
    /// receive path indicates session desync.
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            1000 => Ok(CommandCode::Connect),
            1001 => Ok(CommandCode::Exit),
            1004 => Ok(CommandCode::Restart),
            1102 => Ok(CommandCode::Auth),
            201 => Ok(CommandCode::GetTime),
            202 => Ok(CommandCode::SetTime),
            15 => Ok(CommandCode::ClearAttLog),
            9 => Ok(CommandCode::ReadUsers),
            13 => Ok(CommandCode::ReadAttLog),
            50 => Ok(CommandCode::GetFreeSizes),
            2000 => Ok(CommandCode::AckOk),
            2001 => Ok(CommandCode::AckError),
            2005 => Ok(CommandCode::AckUnauth),
            1500 => Ok(CommandCode::PrepareData),
            1501 => Ok(CommandCode::Data),
            1502 => Ok(CommandCode::FreeData),
            _ => Err(Error::Protocol {
                message: format!("Unknown command code: {value}"),
            }),
        }
    }

    /// The wire value of this code.
    #[inline]
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Returns `true` for codes the device sends as replies.
    #[inline]
    #[must_use]
    pub fn is_reply(self) -> bool {
        matches!(
            self,
            CommandCode::AckOk
                | CommandCode::AckError
                | CommandCode::AckUnauth
                | CommandCode::PrepareData
                | CommandCode::Data
                | CommandCode::FreeData
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1000, CommandCode::Connect)]
    #[case(9, CommandCode::ReadUsers)]
    #[case(13, CommandCode::ReadAttLog)]
    #[case(2000, CommandCode::AckOk)]
    #[case(1500, CommandCode::PrepareData)]
    fn test_roundtrip(#[case] value: u16, #[case] code: CommandCode) {
        assert_eq!(CommandCode::from_u16(value).unwrap(), code);
        assert_eq!(code.to_u16(), value);
    }

    #[test]
    fn test_unknown_code() {
        assert!(CommandCode::from_u16(9999).is_err());
    }

    #[test]
    fn test_reply_classification() {
        assert!(CommandCode::AckOk.is_reply());
        assert!(CommandCode::Data.is_reply());
        assert!(!CommandCode::Connect.is_reply());
        assert!(!CommandCode::ReadUsers.is_reply());
    }
}
