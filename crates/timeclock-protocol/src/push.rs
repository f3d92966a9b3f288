//! Push-protocol text codec.
//!
//! Push devices deliver data as newline-delimited, tab-separated text grouped
//! by a table discriminator. Decoding is line-at-a-time and tolerant: a
//! malformed line is recorded as one failure and never aborts the batch,
//! because the device has no retry semantics for partial rejection.

use chrono::NaiveDateTime;
use timeclock_core::{
    Error, ExternalUserId, OperationRecord, Privilege, PunchKind, PunchRecord, Result,
    TemplateKind, TemplateRecord, UserRecord, VerifyMethod,
    constants::{PUSH_FIELD_SEPARATOR, PUSH_TIMESTAMP_FORMAT},
};
use tracing::debug;

/// Table discriminator sent by the device with each data post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushTable {
    /// Attendance punches
    AttLog,
    /// Enrolled users
    User,
    /// Device operation log
    OperLog,
    /// Fingerprint templates
    FingerTemplate,
    /// Face templates
    FaceTemplate,
}

impl PushTable {
    /// Parse a table discriminator. Spelling varies by firmware generation,
    /// so the known aliases are accepted.
    ///
    /// # Errors
    /// Returns `Error::Protocol` for an unknown discriminator.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ATTLOG" => Ok(PushTable::AttLog),
            "USER" | "USERINFO" => Ok(PushTable::User),
            "OPERLOG" => Ok(PushTable::OperLog),
            "FINGERTMP" | "TEMPLATEV10" => Ok(PushTable::FingerTemplate),
            "FACE" => Ok(PushTable::FaceTemplate),
            _ => Err(Error::Protocol {
                message: format!("Unknown push table: {s}"),
            }),
        }
    }

    /// Minimum field count for a line of this table.
    #[must_use]
    pub fn min_fields(self) -> usize {
        match self {
            PushTable::AttLog | PushTable::User => 2,
            PushTable::OperLog | PushTable::FingerTemplate | PushTable::FaceTemplate => 3,
        }
    }
}

/// One decoded push line.
#[derive(Debug, Clone, PartialEq)]
pub enum PushRecord {
    Punch(PunchRecord),
    User(UserRecord),
    Operation(OperationRecord),
    Template(TemplateRecord),
}

/// A line that failed to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFailure {
    /// 1-based line number within the posted body
    pub line: usize,
    pub message: String,
}

/// Result of decoding one posted body.
#[derive(Debug, Clone, Default)]
pub struct PushBatch {
    pub records: Vec<PushRecord>,
    pub failures: Vec<LineFailure>,
}

impl PushBatch {
    /// Total lines considered, decoded and failed together.
    #[must_use]
    pub fn total(&self) -> usize {
        self.records.len() + self.failures.len()
    }
}

/// Decode a full posted body for one table.
///
/// Blank lines are skipped. Every non-blank line either contributes a record
/// or a [`LineFailure`]; the function itself never fails.
#[must_use]
pub fn decode_batch(table: PushTable, body: &str) -> PushBatch {
    let mut batch = PushBatch::default();

    for (idx, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(table, line) {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                debug!(line = idx + 1, error = %e, "Rejected push line");
                batch.failures.push(LineFailure {
                    line: idx + 1,
                    message: e.to_string(),
                });
            }
        }
    }

    batch
}

/// Decode a single push line for the given table.
pub fn decode_line(table: PushTable, line: &str) -> Result<PushRecord> {
    let fields: Vec<&str> = line.split(PUSH_FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() < table.min_fields() {
        return Err(Error::InvalidRecord(format!(
            "Expected at least {} fields, got {}",
            table.min_fields(),
            fields.len()
        )));
    }

    match table {
        PushTable::AttLog => decode_attlog(&fields).map(PushRecord::Punch),
        PushTable::User => decode_user(&fields).map(PushRecord::User),
        PushTable::OperLog => decode_operlog(&fields).map(PushRecord::Operation),
        PushTable::FingerTemplate => {
            decode_template(&fields, TemplateKind::Fingerprint).map(PushRecord::Template)
        }
        PushTable::FaceTemplate => {
            decode_template(&fields, TemplateKind::Face).map(PushRecord::Template)
        }
    }
}

/// `user_id \t timestamp [\t punch \t verify \t work_code \t _ \t _ \t temperature]`
fn decode_attlog(fields: &[&str]) -> Result<PunchRecord> {
    let user_id = ExternalUserId::new(fields[0])?;
    let punch_time = parse_timestamp(fields[1])?;

    // Unknown-but-numeric codes degrade rather than fail; firmware revisions
    // disagree on the extended values
    let kind = match optional(fields, 2) {
        Some(raw) => PunchKind::from_u8(parse_u8(raw, "punch kind")?)
            .unwrap_or(PunchKind::Unspecified),
        None => PunchKind::Unspecified,
    };

    let mut record = PunchRecord::new(user_id, punch_time, kind);
    if let Some(raw) = optional(fields, 3) {
        record.verify_method = VerifyMethod::from_u8(parse_u8(raw, "verify method")?).ok();
    }
    if let Some(raw) = optional(fields, 4) {
        record.work_code = raw.parse::<u32>().ok();
    }
    if let Some(raw) = optional(fields, 7) {
        record.temperature = raw.parse::<f32>().ok().filter(|t| *t > 0.0);
    }
    Ok(record)
}

/// `user_id \t name [\t privilege \t password \t card \t group]`
fn decode_user(fields: &[&str]) -> Result<UserRecord> {
    let mut user = UserRecord::new(ExternalUserId::new(fields[0])?, fields[1].to_string());

    if let Some(raw) = optional(fields, 2) {
        user.privilege =
            Privilege::from_u8(parse_u8(raw, "privilege")?).unwrap_or(Privilege::User);
    }
    if let Some(raw) = optional(fields, 3) {
        user.password = raw.to_string();
    }
    if let Some(raw) = optional(fields, 4) {
        user.card_number = raw.parse::<u32>().map_err(|_| {
            Error::InvalidRecord(format!("Invalid card number: {raw}"))
        })?;
    }
    if let Some(raw) = optional(fields, 5) {
        user.group = parse_u8(raw, "group")?;
    }
    Ok(user)
}

/// `op_code \t operator \t timestamp [\t detail...]`
fn decode_operlog(fields: &[&str]) -> Result<OperationRecord> {
    let op_code = fields[0]
        .parse::<u16>()
        .map_err(|_| Error::InvalidRecord(format!("Invalid op code: {}", fields[0])))?;

    Ok(OperationRecord {
        op_code,
        operator: fields[1].to_string(),
        occurred_at: parse_timestamp(fields[2]).ok(),
        detail: fields.get(3..).unwrap_or_default().join("\t"),
    })
}

/// `user_id \t index \t size [\t flag [\t data]]`
///
/// Trailing base64 data is accepted and dropped; only the enrollment fact
/// is kept.
fn decode_template(fields: &[&str], kind: TemplateKind) -> Result<TemplateRecord> {
    let size = fields[2]
        .parse::<u32>()
        .map_err(|_| Error::InvalidRecord(format!("Invalid template size: {}", fields[2])))?;

    Ok(TemplateRecord {
        user_id: ExternalUserId::new(fields[0])?,
        kind,
        index: parse_u8(fields[1], "template index")?,
        size,
    })
}

fn optional<'a>(fields: &[&'a str], idx: usize) -> Option<&'a str> {
    fields.get(idx).copied().filter(|f| !f.is_empty())
}

fn parse_u8(raw: &str, what: &str) -> Result<u8> {
    raw.parse::<u8>()
        .map_err(|_| Error::InvalidRecord(format!("Invalid {what}: {raw}")))
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, PUSH_TIMESTAMP_FORMAT)
        .map_err(|e| Error::InvalidRecord(format!("Invalid timestamp '{raw}': {e}")))
}

/// Serialize a user record as a USER table line, the mirror of
/// [`decode_line`] for enroll-user command payloads.
#[must_use]
pub fn encode_user_line(user: &UserRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        user.user_id.as_str(),
        user.name,
        user.privilege.to_u8(),
        user.password,
        user.card_number,
        user.group,
    )
}

/// Serialize one queued command in the device's reply syntax: `C:<id>:<VERB>`.
#[must_use]
pub fn format_command_reply(command_id: i64, verb: &str) -> String {
    format!("C:{command_id}:{verb}")
}

/// Join command replies into a handshake response body. An empty queue
/// produces "OK" so the device treats the call-in as acknowledged.
#[must_use]
pub fn format_handshake_body(commands: &[(i64, String)]) -> String {
    if commands.is_empty() {
        return timeclock_core::constants::PUSH_ACK.to_string();
    }
    commands
        .iter()
        .map(|(id, verb)| format_command_reply(*id, verb))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ATTLOG", PushTable::AttLog)]
    #[case("attlog", PushTable::AttLog)]
    #[case("USER", PushTable::User)]
    #[case("USERINFO", PushTable::User)]
    #[case("OPERLOG", PushTable::OperLog)]
    #[case("FINGERTMP", PushTable::FingerTemplate)]
    #[case("TEMPLATEV10", PushTable::FingerTemplate)]
    #[case("FACE", PushTable::FaceTemplate)]
    fn test_table_parse(#[case] input: &str, #[case] expected: PushTable) {
        assert_eq!(PushTable::parse(input).unwrap(), expected);
    }

    #[test]
    fn test_table_parse_unknown() {
        assert!(PushTable::parse("BIODATA").is_err());
    }

    #[test]
    fn test_attlog_minimal() {
        let record = decode_line(PushTable::AttLog, "42\t2024-01-15 09:00:00").unwrap();
        let PushRecord::Punch(punch) = record else {
            panic!("expected punch");
        };
        assert_eq!(punch.user_id.as_str(), "42");
        assert_eq!(punch.kind, PunchKind::Unspecified);
        assert!(punch.verify_method.is_none());
    }

    #[test]
    fn test_attlog_full() {
        let line = "42\t2024-01-15 09:00:00\t0\t1\t12\t0\t0\t36.5";
        let PushRecord::Punch(punch) = decode_line(PushTable::AttLog, line).unwrap() else {
            panic!("expected punch");
        };
        assert_eq!(punch.kind, PunchKind::CheckIn);
        assert_eq!(punch.verify_method, Some(VerifyMethod::Fingerprint));
        assert_eq!(punch.work_code, Some(12));
        assert_eq!(punch.temperature, Some(36.5));
    }

    #[test]
    fn test_attlog_bad_timestamp() {
        assert!(decode_line(PushTable::AttLog, "42\tnot-a-date").is_err());
    }

    #[test]
    fn test_user_line() {
        let line = "1001\tAlice\t6\t\t123456\t1";
        let PushRecord::User(user) = decode_line(PushTable::User, line).unwrap() else {
            panic!("expected user");
        };
        assert_eq!(user.user_id.as_str(), "1001");
        assert_eq!(user.name, "Alice");
        assert_eq!(user.privilege, Privilege::Admin);
        assert_eq!(user.card_number, 123456);
        assert_eq!(user.group, 1);
    }

    #[test]
    fn test_operlog_line() {
        let line = "4\tadmin\t2024-01-15 08:00:00\tmenu\tenroll";
        let PushRecord::Operation(op) = decode_line(PushTable::OperLog, line).unwrap() else {
            panic!("expected operation");
        };
        assert_eq!(op.op_code, 4);
        assert_eq!(op.operator, "admin");
        assert!(op.occurred_at.is_some());
        assert_eq!(op.detail, "menu\tenroll");
    }

    #[test]
    fn test_template_line() {
        let line = "1001\t3\t512\t1\tU1JVQkJFRA==";
        let PushRecord::Template(tpl) =
            decode_line(PushTable::FingerTemplate, line).unwrap()
        else {
            panic!("expected template");
        };
        assert_eq!(tpl.kind, TemplateKind::Fingerprint);
        assert_eq!(tpl.index, 3);
        assert_eq!(tpl.size, 512);
    }

    #[test]
    fn test_template_line_without_data() {
        let PushRecord::Template(tpl) =
            decode_line(PushTable::FaceTemplate, "1001\t0\t2048").unwrap()
        else {
            panic!("expected template");
        };
        assert_eq!(tpl.kind, TemplateKind::Face);
        assert_eq!(tpl.size, 2048);

        assert!(decode_line(PushTable::FingerTemplate, "1001\t3\tblob").is_err());
    }

    #[test]
    fn test_batch_tolerates_malformed_line() {
        let body = "1\t2024-01-15 08:00:00\n\
                    2\t2024-01-15 08:01:00\n\
                    3\n\
                    4\t2024-01-15 08:02:00\n\
                    5\t2024-01-15 08:03:00";
        let batch = decode_batch(PushTable::AttLog, body);
        assert_eq!(batch.total(), 5);
        assert_eq!(batch.records.len(), 4);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].line, 3);
    }

    #[test]
    fn test_batch_skips_blank_lines() {
        let body = "\n1\t2024-01-15 08:00:00\n\n";
        let batch = decode_batch(PushTable::AttLog, body);
        assert_eq!(batch.total(), 1);
        assert_eq!(batch.records.len(), 1);
    }

    #[test]
    fn test_command_reply_format() {
        assert_eq!(format_command_reply(17, "REBOOT"), "C:17:REBOOT");
        assert_eq!(format_handshake_body(&[]), "OK");
        assert_eq!(
            format_handshake_body(&[(1, "REBOOT".to_string()), (2, "SET TIME".to_string())]),
            "C:1:REBOOT\nC:2:SET TIME"
        );
    }

    #[test]
    fn test_user_line_round_trip() {
        let mut user = UserRecord::new(ExternalUserId::new("1001").unwrap(), "Alice".to_string());
        user.privilege = Privilege::Admin;
        user.password = "4321".to_string();
        user.card_number = 55_000;
        user.group = 2;

        let line = encode_user_line(&user);
        let decoded = match decode_line(PushTable::User, &line).unwrap() {
            PushRecord::User(u) => u,
            other => panic!("unexpected record: {other:?}"),
        };
        assert_eq!(decoded, user);
    }
}
