#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::{Device, NewDevice, transport_to_i32};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Repository trait for Device entity operations
///
/// Uses native async trait methods (Edition 2024), so no async-trait crate
/// is needed.
pub trait DeviceRepository: Send + Sync {
    /// Register a new device
    async fn create(&self, device: &NewDevice) -> StorageResult<i64>;

    /// Find a device by its serial number
    async fn find_by_serial(&self, serial: &str) -> StorageResult<Option<Device>>;

    /// Find a device by primary key
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<Device>>;

    /// List all enabled devices
    async fn list_enabled(&self) -> StorageResult<Vec<Device>>;

    /// Refresh the last-seen timestamp
    async fn touch_last_seen(&self, id: i64, when: DateTime<Utc>) -> StorageResult<()>;

    /// Store the counts the device reported about itself
    async fn set_counters(&self, id: i64, user_count: i64, record_count: i64)
    -> StorageResult<()>;
}

/// SQLite implementation of DeviceRepository
pub struct SqliteDeviceRepository {
    pool: SqlitePool,
}

impl SqliteDeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const DEVICE_COLUMNS: &str = "id, serial, name, address, port, comm_key, transport, \
                              enabled, last_seen, user_count, record_count, \
                              created_at, updated_at";

impl DeviceRepository for SqliteDeviceRepository {
    async fn create(&self, device: &NewDevice) -> StorageResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO devices (serial, name, address, port, comm_key, transport,
                                 enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&device.serial)
        .bind(&device.name)
        .bind(&device.address)
        .bind(i64::from(device.port))
        .bind(i64::from(device.comm_key))
        .bind(transport_to_i32(device.transport))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_serial(&self, serial: &str) -> StorageResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE serial = ?"
        ))
        .bind(serial)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    async fn list_enabled(&self) -> StorageResult<Vec<Device>> {
        let devices = sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE enabled = 1 ORDER BY serial"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(devices)
    }

    async fn touch_last_seen(&self, id: i64, when: DateTime<Utc>) -> StorageResult<()> {
        sqlx::query("UPDATE devices SET last_seen = ?, updated_at = ? WHERE id = ?")
            .bind(when)
            .bind(when)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_counters(
        &self,
        id: i64,
        user_count: i64,
        record_count: i64,
    ) -> StorageResult<()> {
        sqlx::query(
            "UPDATE devices SET user_count = ?, record_count = ?, updated_at = ? WHERE id = ?",
        )
        .bind(user_count)
        .bind(record_count)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
