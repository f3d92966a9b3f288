//! HTTP endpoint for push-protocol devices.
//!
//! Push devices dial out on their own schedule and treat anything but a 200
//! `OK` as a transport hiccup to retry, so the handlers answer `OK` even for
//! serials nobody registered and for bodies that fail to decode. Decode
//! failures are logged and counted, never surfaced to the device. Push
//! ingestion does not create sync runs; runs track operator-initiated pulls.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use timeclock_core::{Error, Provenance, PunchRecord, Result, UserRecord};
use timeclock_protocol::{PushBatch, PushRecord, PushTable, decode_batch, format_handshake_body};
use timeclock_storage::repositories::{
    CommandRepository, DeviceRepository, SqliteCommandRepository, SqliteDeviceRepository,
};
use timeclock_storage::{Database, Device, StorageError};

use crate::import::ImportEngine;

/// Shared state behind the push routes. Stateless across requests: every
/// handler resolves the device from its serial, does its work, forgets it.
pub struct PushState {
    devices: SqliteDeviceRepository,
    commands: SqliteCommandRepository,
    engine: ImportEngine,
}

impl PushState {
    #[must_use]
    pub fn new(db: &Database) -> Arc<Self> {
        Arc::new(Self {
            devices: SqliteDeviceRepository::new(db.pool().clone()),
            commands: SqliteCommandRepository::new(db.pool().clone()),
            engine: ImportEngine::new(db),
        })
    }
}

/// Build the device-facing router.
pub fn router(state: Arc<PushState>) -> Router {
    Router::new()
        .route("/iclock/getrequest", get(handshake))
        .route("/iclock/cdata", post(data))
        .route("/iclock/devicecmd", post(devicecmd))
        .with_state(state)
}

#[derive(Deserialize)]
struct SerialQuery {
    #[serde(rename = "SN")]
    sn: String,
}

#[derive(Deserialize)]
struct DataQuery {
    #[serde(rename = "SN")]
    sn: String,
    table: String,
}

/// `GET /iclock/getrequest?SN=`: the device calls in; drain its queue.
async fn handshake(
    State(state): State<Arc<PushState>>,
    Query(query): Query<SerialQuery>,
) -> (StatusCode, String) {
    let device = match known_device(&state, &query.sn).await {
        Ok(Some(device)) => device,
        Ok(None) => return ok(),
        Err(e) => return internal_error(e),
    };

    if let Err(e) = state
        .devices
        .touch_last_seen(device.id, chrono::Utc::now())
        .await
    {
        return internal_error(e);
    }

    let drained = match state.commands.drain(device.id).await {
        Ok(drained) => drained,
        Err(e) => return internal_error(e),
    };

    let replies: Vec<(i64, String)> = drained
        .iter()
        .filter_map(|command| {
            let Some(kind) = command.get_kind() else {
                warn!(command_id = command.id, kind = command.kind, "Unknown command kind");
                return None;
            };
            let verb = if command.payload.is_empty() {
                kind.verb().to_string()
            } else {
                format!("{} {}", kind.verb(), command.payload)
            };
            Some((command.id, verb))
        })
        .collect();

    if !replies.is_empty() {
        info!(serial = query.sn, count = replies.len(), "Delivering queued commands");
    }
    (StatusCode::OK, format_handshake_body(&replies))
}

/// `POST /iclock/cdata?SN=&table=`: data upload, any table.
async fn data(
    State(state): State<Arc<PushState>>,
    Query(query): Query<DataQuery>,
    body: String,
) -> (StatusCode, String) {
    let device = match known_device(&state, &query.sn).await {
        Ok(Some(device)) => device,
        Ok(None) => return ok(),
        Err(e) => return internal_error(e),
    };

    let Ok(table) = PushTable::parse(&query.table) else {
        warn!(serial = query.sn, table = query.table, "Unknown push table ignored");
        return ok();
    };

    let batch = decode_batch(table, &body);
    debug!(
        serial = query.sn,
        table = ?table,
        records = batch.records.len(),
        failures = batch.failures.len(),
        "Push batch decoded"
    );

    match ingest(&state, &device, table, batch).await {
        Ok(()) => ok(),
        Err(e) => internal_error(e),
    }
}

/// `POST /iclock/devicecmd?SN=`: command execution report, body
/// `ID=<n>&Return=<code>`.
async fn devicecmd(
    State(state): State<Arc<PushState>>,
    Query(query): Query<SerialQuery>,
    body: String,
) -> (StatusCode, String) {
    match known_device(&state, &query.sn).await {
        Ok(Some(_)) => {}
        Ok(None) => return ok(),
        Err(e) => return internal_error(e),
    }

    let fields: HashMap<&str, &str> = body
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect();
    let Some(command_id) = fields.get("ID").and_then(|raw| raw.parse::<i64>().ok()) else {
        warn!(serial = query.sn, body, "Malformed command report ignored");
        return ok();
    };
    let return_code = fields
        .get("Return")
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(-1);

    let outcome = if return_code == 0 {
        state.commands.acknowledge(command_id, return_code).await
    } else {
        state.commands.mark_failed(command_id).await.map(|()| true)
    };
    match outcome {
        Ok(applied) => {
            debug!(serial = query.sn, command_id, return_code, applied, "Command report");
            ok()
        }
        Err(e) => internal_error(e),
    }
}

async fn ingest(
    state: &Arc<PushState>,
    device: &Device,
    table: PushTable,
    batch: PushBatch,
) -> std::result::Result<(), StorageError> {
    let mut punches: Vec<Result<PunchRecord>> = Vec::new();
    let mut users: Vec<Result<UserRecord>> = Vec::new();
    let mut templates = Vec::new();

    for record in batch.records {
        match record {
            PushRecord::Punch(punch) => punches.push(Ok(punch)),
            PushRecord::User(user) => users.push(Ok(user)),
            PushRecord::Template(template) => templates.push(template),
            PushRecord::Operation(op) => {
                info!(
                    serial = device.serial,
                    op_code = op.op_code,
                    operator = op.operator,
                    detail = op.detail,
                    "Device operation log"
                );
            }
        }
    }

    // Line failures count against the table that was being decoded
    for failure in batch.failures {
        let err = Error::InvalidRecord(format!("line {}: {}", failure.line, failure.message));
        match table {
            PushTable::AttLog => punches.push(Err(err)),
            PushTable::User => users.push(Err(err)),
            _ => warn!(serial = device.serial, "Rejected push line: {}", err),
        }
    }

    if !punches.is_empty() {
        let summary = state
            .engine
            .import_attendance(device.id, punches, Provenance::Push, None)
            .await?;
        info!(
            serial = device.serial,
            total = summary.total,
            inserted = summary.inserted,
            failed = summary.failed,
            "Push attendance imported"
        );
    }
    if !users.is_empty() {
        let summary = state.engine.import_users(device.id, users, true).await?;
        info!(
            serial = device.serial,
            total = summary.total,
            created = summary.created,
            failed = summary.failed,
            "Push users imported"
        );
    }
    if !templates.is_empty() {
        let applied = state.engine.apply_templates(device.id, &templates).await?;
        debug!(serial = device.serial, applied, "Enrollment flags updated");
    }

    Ok(())
}

async fn known_device(
    state: &Arc<PushState>,
    serial: &str,
) -> std::result::Result<Option<Device>, StorageError> {
    let device = state.devices.find_by_serial(serial).await?;
    if device.is_none() {
        // Unregistered devices retry forever; answer OK and move on
        debug!(serial, "Push request from unknown serial");
    }
    Ok(device)
}

fn ok() -> (StatusCode, String) {
    (StatusCode::OK, timeclock_core::constants::PUSH_ACK.to_string())
}

fn internal_error(e: StorageError) -> (StatusCode, String) {
    error!("Push handler storage failure: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "ERROR".to_string())
}
