//! Sync orchestration over pull devices and the shared command queue.
//!
//! Every pull operation follows the same shape: resolve what to do before
//! touching the network, claim the device lease, open a session, record the
//! outcome as a sync run. Push ingestion never comes through here and never
//! creates runs; see the `push` module.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use tracing::{info, warn};

use timeclock_core::{
    CommKey, DateRange, Provenance, RangeToken, resolve_range,
    constants::PUSH_TIMESTAMP_FORMAT,
};
use timeclock_net::{DeviceSession, SessionConfig};
use timeclock_protocol::CommandCode;
use timeclock_storage::repositories::{
    CommandRepository, DeviceRepository, RunCounts, SqliteCommandRepository,
    SqliteDeviceRepository, SqliteSyncRunRepository, SyncRunRepository,
};
use timeclock_storage::{
    Command, CommandKind, Database, Device, StorageError, SyncOperation, SyncRun, SyncStatus,
};

use crate::config::ServerConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::import::{AttendanceImportSummary, ImportEngine, UserImportSummary};
use crate::lease::DeviceLeases;

/// Orchestrates pull sessions, imports, command dispatch, and run tracking.
pub struct SyncService {
    devices: SqliteDeviceRepository,
    commands: SqliteCommandRepository,
    runs: SqliteSyncRunRepository,
    engine: ImportEngine,
    leases: DeviceLeases,
    session_timeout: Duration,
    command_stale: Duration,
}

impl SyncService {
    #[must_use]
    pub fn new(db: &Database, config: &ServerConfig) -> Self {
        Self {
            devices: SqliteDeviceRepository::new(db.pool().clone()),
            commands: SqliteCommandRepository::new(db.pool().clone()),
            runs: SqliteSyncRunRepository::new(db.pool().clone()),
            engine: ImportEngine::new(db),
            leases: DeviceLeases::new(config.lease_hold),
            session_timeout: config.session_timeout,
            command_stale: config.command_stale,
        }
    }

    /// Poll a pull device for its user table and import it.
    ///
    /// # Errors
    /// `DeviceBusy` when another operation holds the lease; device and
    /// storage failures otherwise. Every outcome past lease acquisition is
    /// recorded as a sync run.
    pub async fn fetch_and_import_users(
        &self,
        serial: &str,
        link_to_personnel: bool,
    ) -> ServiceResult<SyncRun> {
        let device = self.require_pull_device(serial).await?;
        let _lease = self.leases.claim(device.id, &device.serial)?;
        let config = self.session_config(&device)?;

        let run_id = self
            .runs
            .create(device.id, SyncOperation::FetchUsers, None)
            .await?;
        info!(serial, run_id, "Fetching user table");

        let outcome = self
            .pull_users(&config, device.id, run_id, link_to_personnel)
            .await;
        self.finish_run(&device, run_id, outcome).await
    }

    /// Poll a pull device for attendance within a reporting window.
    ///
    /// The range is resolved before any device contact so an invalid request
    /// never opens a session. Devices return their whole log; punches
    /// outside the window are discarded during import.
    ///
    /// # Errors
    /// `InvalidRange` for a bad token/date combination, `DeviceBusy` while
    /// the lease is held, device and storage failures otherwise.
    pub async fn fetch_and_import_attendance(
        &self,
        serial: &str,
        token: RangeToken,
        custom_start: Option<NaiveDate>,
        custom_end: Option<NaiveDate>,
    ) -> ServiceResult<SyncRun> {
        let now = chrono::Local::now().naive_local();
        let range = resolve_range(token, now, custom_start, custom_end)
            .map_err(ServiceError::Device)?;

        let device = self.require_pull_device(serial).await?;
        let _lease = self.leases.claim(device.id, &device.serial)?;
        let config = self.session_config(&device)?;

        let run_id = self
            .runs
            .create(
                device.id,
                SyncOperation::FetchAttendance,
                Some((range.start, range.end)),
            )
            .await?;
        info!(serial, run_id, %range, "Fetching attendance");

        let outcome = self
            .pull_attendance(&config, device.id, run_id, &range)
            .await;
        self.finish_run(&device, run_id, outcome).await
    }

    /// Dispatch a command to a device.
    ///
    /// Push-capable devices get a queued row the device drains on its next
    /// handshake. Pull-only devices have no way to call in, so the command
    /// executes synchronously over a session and the returned row is already
    /// acknowledged or failed.
    ///
    /// # Errors
    /// `DeviceBusy` when a pull-only target's lease is held; nothing is
    /// queued in that case.
    pub async fn enqueue_command(
        &self,
        serial: &str,
        kind: CommandKind,
        payload: Option<String>,
    ) -> ServiceResult<Command> {
        let device = self.require_device(serial).await?;
        let payload = payload.unwrap_or_default();

        if device.get_transport().is_some_and(|t| t.supports_push()) {
            let id = self.commands.enqueue(device.id, kind, &payload).await?;
            info!(serial, command_id = id, verb = kind.verb(), "Command queued");
            return self.find_command(id).await;
        }

        // Pull-only target: claim the device before creating any row so a
        // busy rejection leaves no orphaned pending command
        let _lease = self.leases.claim(device.id, &device.serial)?;
        let config = self.session_config(&device)?;
        let id = self.commands.enqueue(device.id, kind, &payload).await?;
        // Only the command just created; other pending rows for the device
        // were never executed here and must stay pending
        self.commands.deliver(id).await?;

        let result = self
            .execute_pull_command(&config, device.id, kind, &payload)
            .await;
        match result {
            Ok(()) => {
                self.commands.acknowledge(id, 0).await?;
                self.devices.touch_last_seen(device.id, Utc::now()).await?;
                info!(serial, command_id = id, verb = kind.verb(), "Command executed");
            }
            Err(ref e) => {
                self.commands.mark_failed(id).await?;
                warn!(serial, command_id = id, "Command failed: {}", e);
            }
        }
        result?;

        self.find_command(id).await
    }

    /// Recent sync runs for a device, optionally narrowed by operation or
    /// status, newest first.
    pub async fn list_sync_history(
        &self,
        serial: &str,
        operation: Option<SyncOperation>,
        status: Option<SyncStatus>,
        limit: i64,
    ) -> ServiceResult<Vec<SyncRun>> {
        let device = self.require_device(serial).await?;
        let runs = self.runs.list_by_device(device.id, limit).await?;
        Ok(runs
            .into_iter()
            .filter(|run| operation.is_none_or(|op| run.get_operation() == Some(op)))
            .filter(|run| status.is_none_or(|st| run.get_status() == Some(st)))
            .collect())
    }

    /// The claim table guarding pull sessions.
    #[must_use]
    pub fn leases(&self) -> &DeviceLeases {
        &self.leases
    }

    /// Commands that have sat unacknowledged past the staleness cutoff.
    ///
    /// Surfaced for operators; stale commands are never retried
    /// automatically, since the device may have executed them without
    /// confirming.
    pub async fn stale_commands(&self) -> ServiceResult<Vec<Command>> {
        let stale_secs = i64::try_from(self.command_stale.as_secs()).unwrap_or(i64::MAX);
        let cutoff = Utc::now() - chrono::Duration::seconds(stale_secs);
        Ok(self.commands.list_stale(cutoff).await?)
    }

    async fn pull_users(
        &self,
        config: &SessionConfig,
        device_id: i64,
        run_id: i64,
        link_to_personnel: bool,
    ) -> ServiceResult<RunCounts> {
        let mut session = DeviceSession::connect(config.clone())
            .await
            .map_err(timeclock_core::Error::from)?;
        self.runs.mark_running(run_id).await?;

        let records = match session.fetch_users().await {
            Ok(records) => records,
            Err(e) => {
                let _ = session.disconnect().await;
                return Err(timeclock_core::Error::from(e).into());
            }
        };
        let summary = self
            .engine
            .import_users(device_id, records, link_to_personnel)
            .await;
        self.refresh_counters(&mut session, device_id).await?;
        let _ = session.disconnect().await;

        Ok(user_counts(summary?))
    }

    async fn pull_attendance(
        &self,
        config: &SessionConfig,
        device_id: i64,
        run_id: i64,
        range: &DateRange,
    ) -> ServiceResult<RunCounts> {
        let mut session = DeviceSession::connect(config.clone())
            .await
            .map_err(timeclock_core::Error::from)?;
        self.runs.mark_running(run_id).await?;

        let records = match session.fetch_attendance().await {
            Ok(records) => records,
            Err(e) => {
                let _ = session.disconnect().await;
                return Err(timeclock_core::Error::from(e).into());
            }
        };
        let summary = self
            .engine
            .import_attendance(device_id, records, Provenance::Pull, Some(range))
            .await;
        self.refresh_counters(&mut session, device_id).await?;
        let _ = session.disconnect().await;

        Ok(attendance_counts(summary?))
    }

    /// Store the counts the device reports about itself. The pull already
    /// succeeded at this point, so an unanswered query only costs the
    /// counter refresh, not the run.
    async fn refresh_counters(
        &self,
        session: &mut DeviceSession,
        device_id: i64,
    ) -> ServiceResult<()> {
        match session.device_info().await {
            Ok(info) => {
                self.devices
                    .set_counters(
                        device_id,
                        i64::from(info.user_count),
                        i64::from(info.punch_count),
                    )
                    .await?;
            }
            Err(e) => warn!(device_id, "Device counters unavailable: {}", e),
        }
        Ok(())
    }

    async fn execute_pull_command(
        &self,
        config: &SessionConfig,
        device_id: i64,
        kind: CommandKind,
        payload: &str,
    ) -> ServiceResult<()> {
        let mut session = DeviceSession::connect(config.clone())
            .await
            .map_err(timeclock_core::Error::from)?;

        let result: ServiceResult<()> = match kind {
            CommandKind::Reboot => session
                .send_command(CommandCode::Restart, Bytes::new())
                .await
                .map_err(into_device),
            CommandKind::ClearLog => session
                .send_command(CommandCode::ClearAttLog, Bytes::new())
                .await
                .map_err(into_device),
            CommandKind::SetTime => session
                .set_time(parse_set_time_payload(payload))
                .await
                .map_err(into_device),
            // The query verbs are a fetch-and-import; replayed data dedups
            CommandKind::QueryUserInfo => match session.fetch_users().await {
                Ok(records) => self
                    .engine
                    .import_users(device_id, records, false)
                    .await
                    .map(|_| ())
                    .map_err(ServiceError::from),
                Err(e) => Err(into_device(e)),
            },
            CommandKind::QueryAttLog => match session.fetch_attendance().await {
                Ok(records) => self
                    .engine
                    .import_attendance(device_id, records, Provenance::Pull, None)
                    .await
                    .map(|_| ())
                    .map_err(ServiceError::from),
                Err(e) => Err(into_device(e)),
            },
        };

        let _ = session.disconnect().await;
        result
    }

    fn session_config(&self, device: &Device) -> ServiceResult<SessionConfig> {
        let address = device
            .address
            .as_deref()
            .ok_or_else(|| ServiceError::BadAddress {
                serial: device.serial.clone(),
                detail: "no address on record".to_string(),
            })?;
        let addr: SocketAddr = format!("{}:{}", address, device.port)
            .parse()
            .map_err(|_| ServiceError::BadAddress {
                serial: device.serial.clone(),
                detail: format!("{}:{}", address, device.port),
            })?;

        let mut config = SessionConfig::new(addr);
        config.timeout = self.session_timeout;
        config.comm_key = CommKey::new(u32::try_from(device.comm_key).unwrap_or_default());
        Ok(config)
    }

    async fn finish_run(
        &self,
        device: &Device,
        run_id: i64,
        outcome: ServiceResult<RunCounts>,
    ) -> ServiceResult<SyncRun> {
        match outcome {
            Ok(counts) => {
                if !self.runs.complete(run_id, &counts).await? {
                    warn!(serial = device.serial, run_id, "Run was already finalized");
                }
                self.devices.touch_last_seen(device.id, Utc::now()).await?;
                info!(
                    serial = device.serial,
                    run_id,
                    total = counts.total,
                    imported = counts.imported,
                    "Sync run succeeded"
                );
            }
            Err(e) => {
                self.runs.fail(run_id, &e.to_string()).await?;
                warn!(serial = device.serial, run_id, "Sync run failed: {}", e);
                return Err(e);
            }
        }
        self.find_run(run_id).await
    }

    async fn require_device(&self, serial: &str) -> ServiceResult<Device> {
        self.devices
            .find_by_serial(serial)
            .await?
            .ok_or_else(|| ServiceError::UnknownDevice {
                serial: serial.to_string(),
            })
    }

    async fn require_pull_device(&self, serial: &str) -> ServiceResult<Device> {
        let device = self.require_device(serial).await?;
        if !device.get_transport().is_some_and(|t| t.supports_pull()) {
            return Err(ServiceError::NotPullCapable {
                serial: serial.to_string(),
            });
        }
        Ok(device)
    }

    async fn find_run(&self, run_id: i64) -> ServiceResult<SyncRun> {
        self.runs
            .find_by_id(run_id)
            .await?
            .ok_or_else(|| missing_row("sync_run", run_id))
    }

    async fn find_command(&self, command_id: i64) -> ServiceResult<Command> {
        self.commands
            .find_by_id(command_id)
            .await?
            .ok_or_else(|| missing_row("command", command_id))
    }
}

fn into_device(e: timeclock_net::SessionError) -> ServiceError {
    ServiceError::Device(timeclock_core::Error::from(e))
}

fn missing_row(entity: &str, id: i64) -> ServiceError {
    ServiceError::Storage(StorageError::missing(entity, id))
}

fn user_counts(summary: UserImportSummary) -> RunCounts {
    RunCounts {
        total: summary.total as i64,
        imported: summary.created as i64,
        skipped: summary.skipped as i64,
        failed: summary.failed as i64,
        errors: summary.errors,
    }
}

fn attendance_counts(summary: AttendanceImportSummary) -> RunCounts {
    RunCounts {
        total: summary.total as i64,
        imported: summary.inserted as i64,
        skipped: summary.skipped as i64,
        failed: summary.failed as i64,
        errors: summary.errors,
    }
}

/// A SET TIME payload carries an explicit timestamp; an empty one means
/// "sync to server time now".
fn parse_set_time_payload(payload: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(payload, PUSH_TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| chrono::Local::now().naive_local())
}
