//! End-to-end tests for the push HTTP endpoint.
//!
//! Requests go through the real router via `tower::ServiceExt::oneshot`
//! against an in-memory database, exactly as a device would send them.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use timeclock_server::{PushState, push};
use timeclock_storage::repositories::{
    AttendanceLogRepository, CommandRepository, DeviceRepository, DeviceUserRepository,
    PersonnelRepository, SqliteAttendanceLogRepository, SqliteCommandRepository,
    SqliteDeviceRepository, SqliteDeviceUserRepository, SqlitePersonnelRepository,
    SqliteSyncRunRepository, SyncRunRepository,
};
use timeclock_storage::{CommandKind, CommandState, Database, NewDevice};

async fn setup() -> (Database, Router, i64) {
    let db = Database::in_memory().await.unwrap();
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let device_id = devices
        .create(&NewDevice::push("SN001", "Front Door"))
        .await
        .unwrap();
    let app = push::router(PushState::new(&db));
    (db, app, device_id)
}

async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_attlog_end_to_end() {
    let (db, app, device_id) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/iclock/cdata?SN=SN001&table=ATTLOG",
        "42\t2024-01-15 09:00:00\t0\t1\n",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let logs = SqliteAttendanceLogRepository::new(db.pool().clone());
    let rows = logs
        .list_by_device_in_range(
            device_id,
            chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 16).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, "42");
    assert_eq!(rows[0].provenance, "push");

    // Push ingestion never creates sync runs
    let runs = SqliteSyncRunRepository::new(db.pool().clone());
    assert!(runs.list_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_attlog_replay_is_idempotent() {
    let (db, app, device_id) = setup().await;
    let body = "42\t2024-01-15 09:00:00\n43\t2024-01-15 09:01:00\n";

    send(&app, "POST", "/iclock/cdata?SN=SN001&table=ATTLOG", body).await;
    send(&app, "POST", "/iclock/cdata?SN=SN001&table=ATTLOG", body).await;

    let logs = SqliteAttendanceLogRepository::new(db.pool().clone());
    assert_eq!(logs.count_by_device(device_id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_malformed_lines_do_not_block_the_batch() {
    let (db, app, device_id) = setup().await;

    // Five lines, one of them too short to decode
    let body = "1\t2024-01-15 08:00:00\n\
                2\t2024-01-15 08:01:00\n\
                oops\n\
                3\t2024-01-15 08:02:00\n\
                4\t2024-01-15 08:03:00\n";
    let (status, reply) = send(&app, "POST", "/iclock/cdata?SN=SN001&table=ATTLOG", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, "OK");

    let logs = SqliteAttendanceLogRepository::new(db.pool().clone());
    assert_eq!(logs.count_by_device(device_id).await.unwrap(), 4);
}

#[tokio::test]
async fn test_unknown_serial_gets_ok_without_side_effects() {
    let (db, app, _) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/iclock/cdata?SN=GHOST&table=ATTLOG",
        "42\t2024-01-15 09:00:00\n",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let logs = SqliteAttendanceLogRepository::new(db.pool().clone());
    assert_eq!(logs.count_all().await.unwrap(), 0);

    let (status, body) = send(&app, "GET", "/iclock/getrequest?SN=GHOST", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_user_upload_links_personnel_and_stays_write_once() {
    let (db, app, device_id) = setup().await;

    send(
        &app,
        "POST",
        "/iclock/cdata?SN=SN001&table=USER",
        "1001\tAlice\t0\t\t0\t1\n1002\tBob\n",
    )
    .await;

    let users = SqliteDeviceUserRepository::new(db.pool().clone());
    assert_eq!(users.count_by_device(device_id).await.unwrap(), 2);

    let personnel = SqlitePersonnelRepository::new(db.pool().clone());
    assert_eq!(personnel.count().await.unwrap(), 2);

    // A local rename survives the device re-announcing the user
    users.update_name(device_id, "1001", "Alice Renamed").await.unwrap();
    send(
        &app,
        "POST",
        "/iclock/cdata?SN=SN001&table=USER",
        "1001\tAlice\n",
    )
    .await;
    let alice = users.find(device_id, "1001").await.unwrap().unwrap();
    assert_eq!(alice.name, "Alice Renamed");
}

#[tokio::test]
async fn test_template_upload_sets_enrollment_flag() {
    let (db, app, device_id) = setup().await;

    send(
        &app,
        "POST",
        "/iclock/cdata?SN=SN001&table=USER",
        "1001\tAlice\n",
    )
    .await;
    send(
        &app,
        "POST",
        "/iclock/cdata?SN=SN001&table=FINGERTMP",
        "1001\t0\t512\t1\tBASE64DATA\n",
    )
    .await;

    let users = SqliteDeviceUserRepository::new(db.pool().clone());
    let alice = users.find(device_id, "1001").await.unwrap().unwrap();
    assert!(alice.has_fingerprint);
    assert!(!alice.has_face);
}

#[tokio::test]
async fn test_handshake_drains_command_queue() {
    let (db, app, device_id) = setup().await;
    let commands = SqliteCommandRepository::new(db.pool().clone());
    let reboot_id = commands.enqueue(device_id, CommandKind::Reboot, "").await.unwrap();
    let time_id = commands
        .enqueue(device_id, CommandKind::SetTime, "2024-01-15 10:00:00")
        .await
        .unwrap();

    let (status, body) = send(&app, "GET", "/iclock/getrequest?SN=SN001", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        format!("C:{reboot_id}:REBOOT\nC:{time_id}:SET TIME 2024-01-15 10:00:00")
    );

    // Queue is now empty; the next call-in has nothing to deliver
    let (_, body) = send(&app, "GET", "/iclock/getrequest?SN=SN001", "").await;
    assert_eq!(body, "OK");

    // The handshake recorded device contact
    let devices = SqliteDeviceRepository::new(db.pool().clone());
    let device = devices.find_by_id(device_id).await.unwrap().unwrap();
    assert!(device.last_seen.is_some());
}

#[tokio::test]
async fn test_devicecmd_reports_command_outcomes() {
    let (db, app, device_id) = setup().await;
    let commands = SqliteCommandRepository::new(db.pool().clone());
    let ok_id = commands.enqueue(device_id, CommandKind::Reboot, "").await.unwrap();
    let bad_id = commands.enqueue(device_id, CommandKind::ClearLog, "").await.unwrap();

    // Deliver both via handshake
    send(&app, "GET", "/iclock/getrequest?SN=SN001", "").await;

    let (status, body) = send(
        &app,
        "POST",
        "/iclock/devicecmd?SN=SN001",
        &format!("ID={ok_id}&Return=0"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    send(
        &app,
        "POST",
        "/iclock/devicecmd?SN=SN001",
        &format!("ID={bad_id}&Return=5"),
    )
    .await;

    let ok_row = commands.find_by_id(ok_id).await.unwrap().unwrap();
    assert_eq!(ok_row.get_state(), Some(CommandState::Acknowledged));
    assert_eq!(ok_row.result_code, Some(0));

    let bad_row = commands.find_by_id(bad_id).await.unwrap().unwrap();
    assert_eq!(bad_row.get_state(), Some(CommandState::Failed));

    // Re-reporting an acknowledged command changes nothing
    let (_, body) = send(
        &app,
        "POST",
        "/iclock/devicecmd?SN=SN001",
        &format!("ID={ok_id}&Return=0"),
    )
    .await;
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_unknown_table_is_ignored() {
    let (db, app, _) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/iclock/cdata?SN=SN001&table=BIOPHOTO",
        "whatever\n",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let logs = SqliteAttendanceLogRepository::new(db.pool().clone());
    assert_eq!(logs.count_all().await.unwrap(), 0);
}

#[tokio::test]
async fn test_operlog_is_accepted_and_not_stored() {
    let (db, app, _) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/iclock/cdata?SN=SN001&table=OPERLOG",
        "4\tadmin\t2024-01-15 09:00:00\t1001\n",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let logs = SqliteAttendanceLogRepository::new(db.pool().clone());
    assert_eq!(logs.count_all().await.unwrap(), 0);
}
