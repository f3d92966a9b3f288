//! Integration tests for the storage layer
//!
//! Every test runs against a fresh in-memory database with migrations
//! applied, exercising the real SQL including the uniqueness constraints
//! the idempotence guarantees depend on.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use timeclock_core::{Provenance, PunchKind, TemplateKind};
use timeclock_storage::repositories::{
    AttendanceLogRepository, CommandRepository, DeviceRepository, DeviceUserRepository,
    PersonnelRepository, RunCounts, SqliteAttendanceLogRepository, SqliteCommandRepository,
    SqliteDeviceRepository, SqliteDeviceUserRepository, SqlitePersonnelRepository,
    SqliteSyncRunRepository, SyncRunRepository,
};
use timeclock_storage::{
    CommandKind, CommandState, Database, NewAttendanceLog, NewDevice, NewDeviceUser,
    SyncOperation, SyncStatus,
};

async fn setup() -> Database {
    Database::in_memory().await.unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

fn new_user(device_id: i64, user_id: &str, name: &str) -> NewDeviceUser {
    NewDeviceUser {
        device_id,
        user_id: user_id.to_string(),
        name: name.to_string(),
        privilege: 0,
        password: String::new(),
        card_number: 0,
        user_group: 0,
        has_fingerprint: false,
        has_face: false,
    }
}

fn new_punch(device_id: i64, user_id: &str, when: NaiveDateTime) -> NewAttendanceLog {
    NewAttendanceLog {
        device_id,
        user_id: user_id.to_string(),
        punch_time: when,
        punch_kind: i32::from(PunchKind::CheckIn.to_u8()),
        verify_method: Some(1),
        work_code: None,
        temperature: None,
        provenance: Provenance::Pull.as_str().to_string(),
    }
}

#[tokio::test]
async fn test_device_create_and_find() {
    let db = setup().await;
    let repo = SqliteDeviceRepository::new(db.pool().clone());

    let id = repo
        .create(&NewDevice::pull("SN001", "Warehouse", "10.0.0.5", 4370))
        .await
        .unwrap();
    assert!(id > 0);

    let device = repo.find_by_serial("SN001").await.unwrap().unwrap();
    assert_eq!(device.id, id);
    assert_eq!(device.name, "Warehouse");
    assert_eq!(device.address.as_deref(), Some("10.0.0.5"));
    assert!(device.enabled);
    assert!(device.last_seen.is_none());

    assert!(repo.find_by_serial("SN999").await.unwrap().is_none());

    let enabled = repo.list_enabled().await.unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].serial, "SN001");
}

#[tokio::test]
async fn test_device_serial_unique() {
    let db = setup().await;
    let repo = SqliteDeviceRepository::new(db.pool().clone());

    repo.create(&NewDevice::push("SN001", "A")).await.unwrap();
    assert!(repo.create(&NewDevice::push("SN001", "B")).await.is_err());
}

#[tokio::test]
async fn test_device_touch_last_seen() {
    let db = setup().await;
    let repo = SqliteDeviceRepository::new(db.pool().clone());

    let id = repo.create(&NewDevice::push("SN001", "Lobby")).await.unwrap();
    let when = Utc::now();
    repo.touch_last_seen(id, when).await.unwrap();

    let device = repo.find_by_id(id).await.unwrap().unwrap();
    let seen = device.last_seen.unwrap();
    assert!((seen - when).num_seconds().abs() < 2);
}

#[tokio::test]
async fn test_device_set_counters() {
    let db = setup().await;
    let repo = SqliteDeviceRepository::new(db.pool().clone());

    let id = repo.create(&NewDevice::pull("SN001", "A", "10.0.0.5", 4370)).await.unwrap();
    let fresh = repo.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(fresh.user_count, 0);
    assert_eq!(fresh.record_count, 0);

    repo.set_counters(id, 25, 1800).await.unwrap();

    let device = repo.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(device.user_count, 25);
    assert_eq!(device.record_count, 1800);
}

#[tokio::test]
async fn test_device_user_write_once() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let users = SqliteDeviceUserRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::push("SN001", "Lobby")).await.unwrap();

    // First import creates
    assert!(users.insert_if_absent(&new_user(device_id, "1001", "Alice")).await.unwrap());

    // An operator edits the name locally
    users.update_name(device_id, "1001", "Alice Renamed").await.unwrap();

    // Re-importing the original raw record must not undo the edit
    assert!(!users.insert_if_absent(&new_user(device_id, "1001", "Alice")).await.unwrap());
    let stored = users.find(device_id, "1001").await.unwrap().unwrap();
    assert_eq!(stored.name, "Alice Renamed");
    assert!(stored.active);

    assert_eq!(users.count_by_device(device_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_device_user_enrollment_flags() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let users = SqliteDeviceUserRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::push("SN001", "Lobby")).await.unwrap();

    // A template post for an unknown user is reported, not an error
    assert!(!users.set_enrollment(device_id, "1001", TemplateKind::Fingerprint).await.unwrap());

    users.insert_if_absent(&new_user(device_id, "1001", "Alice")).await.unwrap();
    assert!(users.set_enrollment(device_id, "1001", TemplateKind::Fingerprint).await.unwrap());
    assert!(users.set_enrollment(device_id, "1001", TemplateKind::Face).await.unwrap());

    let stored = users.find(device_id, "1001").await.unwrap().unwrap();
    assert!(stored.has_fingerprint);
    assert!(stored.has_face);
}

#[tokio::test]
async fn test_attendance_idempotent_insert() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let logs = SqliteAttendanceLogRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::push("SN001", "Lobby")).await.unwrap();
    let when = at(2024, 1, 15, 9, 0, 0);

    assert!(logs.insert_if_absent(&new_punch(device_id, "42", when)).await.unwrap());
    // Same tuple again: skipped, not an error
    assert!(!logs.insert_if_absent(&new_punch(device_id, "42", when)).await.unwrap());
    assert_eq!(logs.count_all().await.unwrap(), 1);

    // Different punch kind at the same second is a distinct tuple
    let mut out = new_punch(device_id, "42", when);
    out.punch_kind = i32::from(PunchKind::CheckOut.to_u8());
    assert!(logs.insert_if_absent(&out).await.unwrap());
    assert_eq!(logs.count_all().await.unwrap(), 2);
}

#[tokio::test]
async fn test_attendance_range_query_half_open() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let logs = SqliteAttendanceLogRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::push("SN001", "Lobby")).await.unwrap();
    for (user, when) in [
        ("1", at(2024, 1, 14, 23, 59, 59)),
        ("2", at(2024, 1, 15, 0, 0, 0)),
        ("3", at(2024, 1, 15, 12, 0, 0)),
        ("4", at(2024, 1, 16, 0, 0, 0)),
    ] {
        logs.insert_if_absent(&new_punch(device_id, user, when)).await.unwrap();
    }

    let rows = logs
        .list_by_device_in_range(device_id, at(2024, 1, 15, 0, 0, 0), at(2024, 1, 16, 0, 0, 0))
        .await
        .unwrap();
    let users: Vec<_> = rows.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(users, vec!["2", "3"]);
    // Fresh rows have not been handed to the personnel system yet
    assert!(rows.iter().all(|r| !r.linked));
}

#[tokio::test]
async fn test_command_lifecycle() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let commands = SqliteCommandRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::push("SN001", "Lobby")).await.unwrap();

    let id = commands.enqueue(device_id, CommandKind::Reboot, "").await.unwrap();
    let pending = commands.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(pending.get_state(), Some(CommandState::Pending));
    assert_eq!(pending.get_kind(), Some(CommandKind::Reboot));

    // Drain claims and delivers
    let drained = commands.drain(device_id).await.unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].id, id);
    assert_eq!(drained[0].get_state(), Some(CommandState::Delivered));

    // A second drain before acknowledgment sees nothing
    assert!(commands.drain(device_id).await.unwrap().is_empty());

    // Acknowledge once, then verify the second call is a no-op
    assert!(commands.acknowledge(id, 0).await.unwrap());
    assert!(!commands.acknowledge(id, 0).await.unwrap());

    let done = commands.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(done.get_state(), Some(CommandState::Acknowledged));
    assert_eq!(done.result_code, Some(0));
    assert!(done.acknowledged_at.is_some());
}

#[tokio::test]
async fn test_command_deliver_claims_one_row() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let commands = SqliteCommandRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::push("SN001", "Lobby")).await.unwrap();
    let older = commands.enqueue(device_id, CommandKind::Reboot, "").await.unwrap();
    let target = commands.enqueue(device_id, CommandKind::ClearLog, "").await.unwrap();

    assert!(commands.deliver(target).await.unwrap());
    // Already delivered, so a second claim loses
    assert!(!commands.deliver(target).await.unwrap());

    // The other pending row is untouched
    let untouched = commands.find_by_id(older).await.unwrap().unwrap();
    assert_eq!(untouched.get_state(), Some(CommandState::Pending));
}

#[tokio::test]
async fn test_command_drain_preserves_fifo() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let commands = SqliteCommandRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::push("SN001", "Lobby")).await.unwrap();
    let first = commands.enqueue(device_id, CommandKind::SetTime, "").await.unwrap();
    let second = commands.enqueue(device_id, CommandKind::ClearLog, "").await.unwrap();

    let drained = commands.drain(device_id).await.unwrap();
    assert_eq!(drained.iter().map(|c| c.id).collect::<Vec<_>>(), vec![first, second]);
}

#[tokio::test]
async fn test_command_drain_scoped_to_device() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let commands = SqliteCommandRepository::new(db.pool().clone());

    let a = devices.create(&NewDevice::push("SN001", "A")).await.unwrap();
    let b = devices.create(&NewDevice::push("SN002", "B")).await.unwrap();
    commands.enqueue(a, CommandKind::Reboot, "").await.unwrap();
    let b_cmd = commands.enqueue(b, CommandKind::Reboot, "").await.unwrap();

    let drained_a = commands.drain(a).await.unwrap();
    assert_eq!(drained_a.len(), 1);
    assert_ne!(drained_a[0].id, b_cmd);

    assert_eq!(commands.drain(b).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_command_staleness_listing() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let commands = SqliteCommandRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::push("SN001", "Lobby")).await.unwrap();
    let id = commands.enqueue(device_id, CommandKind::Reboot, "").await.unwrap();

    // Nothing is stale against a cutoff in the past
    let past = Utc::now() - chrono::Duration::hours(1);
    assert!(commands.list_stale(past).await.unwrap().is_empty());

    // Everything unacknowledged is stale against a future cutoff
    let future = Utc::now() + chrono::Duration::hours(1);
    let stale = commands.list_stale(future).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, id);

    // Acknowledged commands never count
    commands.drain(device_id).await.unwrap();
    commands.acknowledge(id, 0).await.unwrap();
    assert!(commands.list_stale(future).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_run_lifecycle() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let runs = SqliteSyncRunRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::pull("SN001", "A", "10.0.0.5", 4370)).await.unwrap();
    let range = (at(2024, 1, 15, 0, 0, 0), at(2024, 1, 16, 0, 0, 0));

    let run_id = runs
        .create(device_id, SyncOperation::FetchAttendance, Some(range))
        .await
        .unwrap();
    let pending = runs.find_by_id(run_id).await.unwrap().unwrap();
    assert_eq!(pending.get_status(), Some(SyncStatus::Pending));
    assert_eq!(pending.range_start, Some(range.0));
    assert!(pending.finished_at.is_none());

    // Completing a run that never started must not touch it
    assert!(
        !runs
            .complete(run_id, &RunCounts::default())
            .await
            .unwrap()
    );

    assert!(runs.mark_running(run_id).await.unwrap());
    assert!(!runs.mark_running(run_id).await.unwrap());

    let completed = runs
        .complete(
            run_id,
            &RunCounts {
                total: 10,
                imported: 8,
                skipped: 1,
                failed: 1,
                errors: vec!["line 3: Invalid timestamp".to_string()],
            },
        )
        .await
        .unwrap();
    assert!(completed);

    let done = runs.find_by_id(run_id).await.unwrap().unwrap();
    assert_eq!(done.get_status(), Some(SyncStatus::Succeeded));
    assert_eq!(done.total, 10);
    assert_eq!(done.imported, 8);
    assert_eq!(done.skipped, 1);
    assert_eq!(done.error_list(), vec!["line 3: Invalid timestamp"]);
    assert!(done.finished_at.is_some());
}

#[tokio::test]
async fn test_sync_run_terminal_states_are_immutable() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let runs = SqliteSyncRunRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::pull("SN001", "A", "10.0.0.5", 4370)).await.unwrap();

    let run_id = runs.create(device_id, SyncOperation::FetchUsers, None).await.unwrap();
    runs.mark_running(run_id).await.unwrap();
    assert!(runs.complete(run_id, &RunCounts::default()).await.unwrap());

    // A late failure report must not rewrite the finished row
    assert!(!runs.fail(run_id, "late error").await.unwrap());
    assert!(!runs.complete(run_id, &RunCounts::default()).await.unwrap());

    let run = runs.find_by_id(run_id).await.unwrap().unwrap();
    assert_eq!(run.get_status(), Some(SyncStatus::Succeeded));
    assert!(run.error.is_none());
}

#[tokio::test]
async fn test_sync_run_failure_and_history() {
    let db = setup().await;
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let runs = SqliteSyncRunRepository::new(db.pool().clone());

    let device_id = devices.create(&NewDevice::pull("SN001", "A", "10.0.0.5", 4370)).await.unwrap();

    // A run that fails before the session opens goes pending -> failed
    let first = runs.create(device_id, SyncOperation::FetchUsers, None).await.unwrap();
    assert!(runs.fail(first, "Device unreachable: connection refused").await.unwrap());

    let second = runs.create(device_id, SyncOperation::FetchUsers, None).await.unwrap();
    runs.mark_running(second).await.unwrap();
    runs.complete(second, &RunCounts::default()).await.unwrap();

    let failed = runs.find_by_id(first).await.unwrap().unwrap();
    assert_eq!(failed.get_status(), Some(SyncStatus::Failed));
    assert!(failed.error.as_deref().unwrap().contains("unreachable"));

    let history = runs.list_by_device(device_id, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    // Newest first
    assert_eq!(history[0].id, second);

    assert_eq!(runs.list_recent(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_personnel_link_idempotent() {
    let db = setup().await;
    let personnel = SqlitePersonnelRepository::new(db.pool().clone());

    assert!(personnel.link_if_absent("1001", "Alice").await.unwrap());
    assert!(!personnel.link_if_absent("1001", "Someone Else").await.unwrap());
    assert_eq!(personnel.count().await.unwrap(), 1);

    let link = personnel.find_by_user_id("1001").await.unwrap().unwrap();
    assert_eq!(link.display_name, "Alice");
}
