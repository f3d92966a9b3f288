//! Fixed-layout binary records carried in pull-protocol bulk transfers.
//!
//! User table entries are 72 bytes, attendance entries 40 bytes. Strings are
//! NUL-padded fixed-width fields, integers little-endian. Timestamps use the
//! device's packed calendar encoding, decoded here into naive local time.

use bytes::{BufMut, BytesMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use timeclock_core::{
    Error, ExternalUserId, Privilege, PunchKind, PunchRecord, Result, UserRecord, VerifyMethod,
    constants::{PULL_PUNCH_RECORD_LEN, PULL_USER_RECORD_LEN},
};

// User record field offsets
const USER_UID: usize = 0;
const USER_PRIVILEGE: usize = 2;
const USER_PASSWORD: usize = 3;
const USER_NAME: usize = 11;
const USER_CARD: usize = 35;
const USER_GROUP: usize = 39;
const USER_USER_ID: usize = 40;
const USER_ENROLL_FLAGS: usize = 64;

const PASSWORD_FIELD_LEN: usize = 8;
const NAME_FIELD_LEN: usize = 24;
const USER_ID_FIELD_LEN: usize = 24;

// Punch record field offsets
const PUNCH_UID: usize = 0;
const PUNCH_USER_ID: usize = 2;
const PUNCH_VERIFY: usize = 26;
const PUNCH_TIME: usize = 27;
const PUNCH_KIND: usize = 31;

const ENROLL_FINGERPRINT: u8 = 0b01;
const ENROLL_FACE: u8 = 0b10;

/// Decode one 72-byte user table entry.
///
/// Unknown privilege codes degrade to [`Privilege::User`] rather than failing
/// the record, since firmware revisions disagree on the extended codes.
pub fn decode_user(raw: &[u8]) -> Result<UserRecord> {
    if raw.len() != PULL_USER_RECORD_LEN {
        return Err(Error::InvalidRecord(format!(
            "User record must be {PULL_USER_RECORD_LEN} bytes, got {}",
            raw.len()
        )));
    }

    let uid = u16::from_le_bytes([raw[USER_UID], raw[USER_UID + 1]]);
    let user_id_raw = read_cstr(&raw[USER_USER_ID..USER_USER_ID + USER_ID_FIELD_LEN]);
    // Older firmware leaves the string id blank and only fills the slot index
    let user_id = if user_id_raw.is_empty() {
        ExternalUserId::new(&uid.to_string())?
    } else {
        ExternalUserId::new(&user_id_raw)?
    };

    let flags = raw[USER_ENROLL_FLAGS];
    Ok(UserRecord {
        user_id,
        name: read_cstr(&raw[USER_NAME..USER_NAME + NAME_FIELD_LEN]),
        privilege: Privilege::from_u8(raw[USER_PRIVILEGE]).unwrap_or(Privilege::User),
        password: read_cstr(&raw[USER_PASSWORD..USER_PASSWORD + PASSWORD_FIELD_LEN]),
        card_number: u32::from_le_bytes([
            raw[USER_CARD],
            raw[USER_CARD + 1],
            raw[USER_CARD + 2],
            raw[USER_CARD + 3],
        ]),
        group: raw[USER_GROUP],
        has_fingerprint: flags & ENROLL_FINGERPRINT != 0,
        has_face: flags & ENROLL_FACE != 0,
    })
}

/// Encode a user record into the 72-byte wire layout for enrollment.
///
/// `uid` is the device-side slot index the record will occupy.
///
/// # Errors
/// Returns `Error::InvalidRecord` if the name or password exceed their
/// fixed-width fields.
pub fn encode_user(uid: u16, user: &UserRecord) -> Result<BytesMut> {
    if user.name.len() > NAME_FIELD_LEN {
        return Err(Error::InvalidRecord(format!(
            "Name exceeds {NAME_FIELD_LEN} bytes: {}",
            user.name
        )));
    }
    if user.password.len() > PASSWORD_FIELD_LEN {
        return Err(Error::InvalidRecord(
            "Password exceeds field width".to_string(),
        ));
    }

    let mut buf = BytesMut::zeroed(PULL_USER_RECORD_LEN);
    buf[USER_UID..USER_UID + 2].copy_from_slice(&uid.to_le_bytes());
    buf[USER_PRIVILEGE] = user.privilege.to_u8();
    write_padded(&mut buf[USER_PASSWORD..USER_PASSWORD + PASSWORD_FIELD_LEN], &user.password);
    write_padded(&mut buf[USER_NAME..USER_NAME + NAME_FIELD_LEN], &user.name);
    buf[USER_CARD..USER_CARD + 4].copy_from_slice(&user.card_number.to_le_bytes());
    buf[USER_GROUP] = user.group;
    write_padded(
        &mut buf[USER_USER_ID..USER_USER_ID + USER_ID_FIELD_LEN],
        user.user_id.as_str(),
    );
    let mut flags = 0u8;
    if user.has_fingerprint {
        flags |= ENROLL_FINGERPRINT;
    }
    if user.has_face {
        flags |= ENROLL_FACE;
    }
    buf[USER_ENROLL_FLAGS] = flags;
    Ok(buf)
}

/// Decode one 40-byte attendance entry.
pub fn decode_punch(raw: &[u8]) -> Result<PunchRecord> {
    if raw.len() != PULL_PUNCH_RECORD_LEN {
        return Err(Error::InvalidRecord(format!(
            "Punch record must be {PULL_PUNCH_RECORD_LEN} bytes, got {}",
            raw.len()
        )));
    }

    let uid = u16::from_le_bytes([raw[PUNCH_UID], raw[PUNCH_UID + 1]]);
    let user_id_raw = read_cstr(&raw[PUNCH_USER_ID..PUNCH_USER_ID + USER_ID_FIELD_LEN]);
    let user_id = if user_id_raw.is_empty() {
        ExternalUserId::new(&uid.to_string())?
    } else {
        ExternalUserId::new(&user_id_raw)?
    };

    let packed = u32::from_le_bytes([
        raw[PUNCH_TIME],
        raw[PUNCH_TIME + 1],
        raw[PUNCH_TIME + 2],
        raw[PUNCH_TIME + 3],
    ]);

    let mut record = PunchRecord::new(
        user_id,
        decode_packed_time(packed)?,
        PunchKind::from_u8(raw[PUNCH_KIND]).unwrap_or(PunchKind::Unspecified),
    );
    record.verify_method = VerifyMethod::from_u8(raw[PUNCH_VERIFY]).ok();
    Ok(record)
}

/// Decode the device's packed calendar time.
///
/// The encoding counts seconds within a synthetic calendar of 12 fixed
/// 31-day months based at year 2000.
pub fn decode_packed_time(packed: u32) -> Result<NaiveDateTime> {
    let mut t = packed;
    let second = t % 60;
    t /= 60;
    let minute = t % 60;
    t /= 60;
    let hour = t % 24;
    t /= 24;
    let day = t % 31 + 1;
    t /= 31;
    let month = t % 12 + 1;
    t /= 12;
    let year = 2000 + t;

    NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .ok_or_else(|| {
            Error::InvalidRecord(format!("Packed time {packed} is not a valid date"))
        })
}

/// Encode a timestamp into the device's packed calendar time.
///
/// # Errors
/// Returns `Error::InvalidRecord` for timestamps before year 2000, which the
/// encoding cannot represent.
pub fn encode_packed_time(when: NaiveDateTime) -> Result<u32> {
    let year = when.year();
    if year < 2000 {
        return Err(Error::InvalidRecord(format!(
            "Packed time cannot represent year {year}"
        )));
    }

    let days = (year as u32 - 2000) * 12 * 31 + (when.month() - 1) * 31 + (when.day() - 1);
    Ok(days * 86400 + when.hour() * 3600 + when.minute() * 60 + when.second())
}

fn read_cstr(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).trim().to_string()
}

fn write_padded(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    field[..bytes.len()].copy_from_slice(bytes);
}

/// Build a SetTime payload from a timestamp.
pub fn encode_time_payload(when: NaiveDateTime) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32_le(encode_packed_time(when)?);
    Ok(buf)
}

/// Parse a GetTime reply payload into a timestamp.
pub fn decode_time_payload(payload: &[u8]) -> Result<NaiveDateTime> {
    if payload.len() < 4 {
        return Err(Error::protocol("Time payload truncated"));
    }
    decode_packed_time(u32::from_le_bytes([
        payload[0], payload[1], payload[2], payload[3],
    ]))
}
