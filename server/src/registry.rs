//! Device registry.
//!
//! The registry is the server's record of every device that ever sent a
//! heartbeat. Heartbeats create unknown devices as authorized and refresh
//! known ones; only the administrator changes `is_authorized`.

use crate::error::{RegistryError, RegistryResult};
use chrono::{DateTime, Utc};
use devauth_types::{DeviceId, HeartbeatRequest, HeartbeatResponse};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Message sent to authorized devices.
pub const AUTHORIZED_MESSAGE: &str = "device authorized";

/// Message sent to revoked devices.
pub const UNAUTHORIZED_MESSAGE: &str = "device not authorized";

/// One registered device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub software_name: Option<String>,
    pub device_info: Option<Value>,
    pub remark: Option<String>,
    pub is_authorized: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_check: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// A device seen for the first time. New devices are trusted.
    #[must_use]
    pub fn first_contact(request: &HeartbeatRequest, now: DateTime<Utc>) -> Self {
        Self {
            device_id: request.device_id.clone(),
            software_name: request.software_name.clone(),
            device_info: request.device_info.clone(),
            remark: None,
            is_authorized: true,
            created_at: now,
            updated_at: now,
            last_check: Some(now),
        }
    }

    /// Refreshes a known device. Absent fields keep their stored values.
    pub fn apply_heartbeat(&mut self, request: &HeartbeatRequest, now: DateTime<Utc>) {
        if let Some(name) = &request.software_name {
            self.software_name = Some(name.clone());
        }
        if let Some(info) = &request.device_info {
            self.device_info = Some(info.clone());
        }
        self.last_check = Some(now);
        self.updated_at = now;
    }

    /// The verdict returned to the device.
    #[must_use]
    pub fn verdict(&self) -> HeartbeatResponse {
        let message = if self.is_authorized {
            AUTHORIZED_MESSAGE
        } else {
            UNAUTHORIZED_MESSAGE
        };
        HeartbeatResponse {
            authorized: self.is_authorized,
            message: message.to_string(),
        }
    }
}

/// Storage for device records.
///
/// Calls block; async callers run them on the blocking pool.
pub trait DeviceRegistry: Send + Sync {
    /// Creates or refreshes the device named in `request`.
    fn record_heartbeat(&self, request: &HeartbeatRequest) -> RegistryResult<DeviceRecord>;

    fn get(&self, device_id: &str) -> RegistryResult<Option<DeviceRecord>>;

    /// All devices, newest first.
    fn list(&self) -> RegistryResult<Vec<DeviceRecord>>;

    fn set_authorized(&self, device_id: &str, authorized: bool) -> RegistryResult<DeviceRecord>;

    fn set_remark(&self, device_id: &str, remark: Option<String>) -> RegistryResult<DeviceRecord>;

    fn delete(&self, device_id: &str) -> RegistryResult<()>;
}

fn newest_first(records: &mut [DeviceRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.device_id.cmp(&b.device_id))
    });
}

// ── In-memory ────────────────────────────────────────────────────

/// Registry kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    devices: Mutex<HashMap<String, DeviceRecord>>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RegistryResult<MutexGuard<'_, HashMap<String, DeviceRecord>>> {
        self.devices.lock().map_err(|_| RegistryError::Poisoned)
    }

    fn update<F>(&self, device_id: &str, change: F) -> RegistryResult<DeviceRecord>
    where
        F: FnOnce(&mut DeviceRecord),
    {
        let mut devices = self.lock()?;
        let record = devices
            .get_mut(device_id)
            .ok_or_else(|| RegistryError::NotFound(device_id.to_string()))?;
        change(record);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

impl DeviceRegistry for MemoryRegistry {
    fn record_heartbeat(&self, request: &HeartbeatRequest) -> RegistryResult<DeviceRecord> {
        let now = Utc::now();
        let mut devices = self.lock()?;
        let record = devices
            .entry(request.device_id.as_str().to_string())
            .and_modify(|r| r.apply_heartbeat(request, now))
            .or_insert_with(|| DeviceRecord::first_contact(request, now));
        Ok(record.clone())
    }

    fn get(&self, device_id: &str) -> RegistryResult<Option<DeviceRecord>> {
        Ok(self.lock()?.get(device_id).cloned())
    }

    fn list(&self) -> RegistryResult<Vec<DeviceRecord>> {
        let mut records: Vec<_> = self.lock()?.values().cloned().collect();
        newest_first(&mut records);
        Ok(records)
    }

    fn set_authorized(&self, device_id: &str, authorized: bool) -> RegistryResult<DeviceRecord> {
        self.update(device_id, |r| r.is_authorized = authorized)
    }

    fn set_remark(&self, device_id: &str, remark: Option<String>) -> RegistryResult<DeviceRecord> {
        self.update(device_id, |r| r.remark = remark)
    }

    fn delete(&self, device_id: &str) -> RegistryResult<()> {
        self.lock()?
            .remove(device_id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(device_id.to_string()))
    }
}

// ── SQLite ───────────────────────────────────────────────────────

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS devices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id TEXT NOT NULL UNIQUE,
        software_name TEXT,
        device_info TEXT,
        remark TEXT,
        is_authorized INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        last_check TEXT
    );
";

const SELECT_COLUMNS: &str = "SELECT device_id, software_name, device_info, remark, \
     is_authorized, created_at, updated_at, last_check FROM devices";

/// Registry persisted in a SQLite database.
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    /// Opens (or creates) a registry at the given path.
    pub fn open(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            RegistryError::Storage(format!("failed to open device registry: {e}"))
        })?;
        Self::init(conn)
    }

    /// Opens an in-memory registry.
    pub fn open_in_memory() -> RegistryResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            RegistryError::Storage(format!("failed to open in-memory registry: {e}"))
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> RegistryResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| RegistryError::Storage(format!("failed to init registry schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> RegistryResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RegistryError::Poisoned)
    }

    fn fetch(conn: &Connection, device_id: &str) -> RegistryResult<Option<DeviceRecord>> {
        let raw = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE device_id = ?1"),
                params![device_id],
                RawDevice::from_row,
            )
            .optional()?;
        raw.map(RawDevice::into_record).transpose()
    }

    fn update(
        &self,
        device_id: &str,
        sql: &str,
        value: &dyn rusqlite::ToSql,
    ) -> RegistryResult<DeviceRecord> {
        let conn = self.lock()?;
        let changed = conn.execute(sql, params![value, Utc::now().to_rfc3339(), device_id])?;
        if changed == 0 {
            return Err(RegistryError::NotFound(device_id.to_string()));
        }
        Self::fetch(&conn, device_id)?.ok_or_else(|| RegistryError::NotFound(device_id.to_string()))
    }
}

impl DeviceRegistry for SqliteRegistry {
    fn record_heartbeat(&self, request: &HeartbeatRequest) -> RegistryResult<DeviceRecord> {
        let now = Utc::now().to_rfc3339();
        let device_info = request
            .device_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RegistryError::Corrupt(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO devices
                (device_id, software_name, device_info, is_authorized, created_at, updated_at, last_check)
             VALUES (?1, ?2, ?3, 1, ?4, ?4, ?4)
             ON CONFLICT(device_id) DO UPDATE SET
                software_name = COALESCE(excluded.software_name, devices.software_name),
                device_info = COALESCE(excluded.device_info, devices.device_info),
                last_check = excluded.last_check,
                updated_at = excluded.updated_at",
            params![request.device_id.as_str(), request.software_name, device_info, now],
        )?;
        Self::fetch(&conn, request.device_id.as_str())?
            .ok_or_else(|| RegistryError::NotFound(request.device_id.to_string()))
    }

    fn get(&self, device_id: &str) -> RegistryResult<Option<DeviceRecord>> {
        let conn = self.lock()?;
        Self::fetch(&conn, device_id)
    }

    fn list(&self) -> RegistryResult<Vec<DeviceRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(SELECT_COLUMNS)?;
        let rows = stmt.query_map([], RawDevice::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        newest_first(&mut records);
        Ok(records)
    }

    fn set_authorized(&self, device_id: &str, authorized: bool) -> RegistryResult<DeviceRecord> {
        self.update(
            device_id,
            "UPDATE devices SET is_authorized = ?1, updated_at = ?2 WHERE device_id = ?3",
            &authorized,
        )
    }

    fn set_remark(&self, device_id: &str, remark: Option<String>) -> RegistryResult<DeviceRecord> {
        self.update(
            device_id,
            "UPDATE devices SET remark = ?1, updated_at = ?2 WHERE device_id = ?3",
            &remark,
        )
    }

    fn delete(&self, device_id: &str) -> RegistryResult<()> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM devices WHERE device_id = ?1", params![device_id])?;
        if removed == 0 {
            return Err(RegistryError::NotFound(device_id.to_string()));
        }
        Ok(())
    }
}

/// Row as stored, before parsing.
struct RawDevice {
    device_id: String,
    software_name: Option<String>,
    device_info: Option<String>,
    remark: Option<String>,
    is_authorized: bool,
    created_at: String,
    updated_at: String,
    last_check: Option<String>,
}

impl RawDevice {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            device_id: row.get(0)?,
            software_name: row.get(1)?,
            device_info: row.get(2)?,
            remark: row.get(3)?,
            is_authorized: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            last_check: row.get(7)?,
        })
    }

    fn into_record(self) -> RegistryResult<DeviceRecord> {
        let device_id = DeviceId::new(&self.device_id)
            .ok_or_else(|| RegistryError::Corrupt("empty device_id".into()))?;
        let device_info = self
            .device_info
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| RegistryError::Corrupt(format!("device_info of {}: {e}", self.device_id)))?;
        Ok(DeviceRecord {
            device_id,
            software_name: self.software_name,
            device_info,
            remark: self.remark,
            is_authorized: self.is_authorized,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            last_check: self.last_check.as_deref().map(parse_time).transpose()?,
        })
    }
}

fn parse_time(value: &str) -> RegistryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RegistryError::Corrupt(format!("timestamp {value:?}: {e}")))
}
