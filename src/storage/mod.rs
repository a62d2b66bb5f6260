//! Schema creation, version check, and CRUD for events and snapshots
//! (`spec.md` §4.3).
//!
//! [`Storage`] owns the single writer connection and offloads each call to
//! a blocking thread via `tokio::task::spawn_blocking`, so a slow disk
//! stalls only the caller, not the cooperative main loop's other
//! suspension points (`SPEC_FULL.md` §4.3). The synchronous CRUD lives on
//! [`StorageInner`] and is unit-tested directly against an in-memory
//! connection.

mod schema;

use crate::domain::{EventId, Pid, StorageError};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A `process_events` row recovered at startup for the current boot.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenEvent {
    pub id: EventId,
    pub pid: Pid,
    pub command: String,
    pub entry_time: f64,
    pub entry_band: String,
    pub peak_score: u32,
    pub peak_band: String,
}

/// Synchronous database operations, usable directly against an in-memory
/// connection in tests and wrapped by [`Storage`] for daemon use.
pub struct StorageInner;

impl StorageInner {
    /// Create the schema on a freshly opened, empty connection.
    pub fn create_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute(schema::CREATE_SCHEMA_VERSION, [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![schema::SCHEMA_VERSION],
        )?;
        conn.execute(schema::CREATE_DAEMON_STATE, [])?;
        conn.execute(schema::CREATE_PROCESS_EVENTS, [])?;
        conn.execute(schema::CREATE_PROCESS_EVENTS_PID_BOOT_INDEX, [])?;
        conn.execute(schema::CREATE_PROCESS_EVENTS_OPEN_INDEX, [])?;
        conn.execute(schema::CREATE_PROCESS_SNAPSHOTS, [])?;
        conn.execute(schema::CREATE_PROCESS_SNAPSHOTS_EVENT_INDEX, [])?;
        Ok(())
    }

    /// Read the stored schema version, if any.
    pub fn read_schema_version(conn: &Connection) -> Result<Option<i64>, StorageError> {
        let exists: bool = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0)?;
        if !exists {
            return Ok(None);
        }
        let version = conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0)).optional()?;
        Ok(version)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_process_event(
        conn: &Connection,
        pid: Pid,
        command: &str,
        boot_time: i64,
        entry_time: f64,
        entry_band: &str,
        peak_score: u32,
        peak_band: &str,
        peak_snapshot_json: &str,
    ) -> Result<EventId, StorageError> {
        conn.execute(
            "INSERT INTO process_events
                (pid, command, boot_time, entry_time, exit_time, entry_band, peak_band, peak_score, peak_snapshot)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?8)",
            params![pid.0, command, boot_time, entry_time, entry_band, peak_band, peak_score, peak_snapshot_json],
        )?;
        Ok(EventId(conn.last_insert_rowid()))
    }

    pub fn insert_process_snapshot(
        conn: &Connection,
        event_id: EventId,
        snapshot_type: &str,
        snapshot_json: &str,
    ) -> Result<(), StorageError> {
        conn.execute(
            "INSERT INTO process_snapshots (event_id, snapshot_type, snapshot) VALUES (?1, ?2, ?3)",
            params![event_id.0, snapshot_type, snapshot_json],
        )?;
        Ok(())
    }

    /// Update an open event's peak. Silently no-ops (per `spec.md` §4.3)
    /// and returns `false` if the event has already been closed; the
    /// caller logs a warning in that case.
    pub fn update_process_event_peak(
        conn: &Connection,
        event_id: EventId,
        peak_score: u32,
        peak_band: &str,
        peak_snapshot_json: &str,
    ) -> Result<bool, StorageError> {
        let changed = conn.execute(
            "UPDATE process_events SET peak_score = ?2, peak_band = ?3, peak_snapshot = ?4
             WHERE id = ?1 AND exit_time IS NULL",
            params![event_id.0, peak_score, peak_band, peak_snapshot_json],
        )?;
        Ok(changed > 0)
    }

    /// Close an event. Tolerates repeated calls (last writer wins); the
    /// tracker is responsible for not calling this twice in practice.
    pub fn close_process_event(conn: &Connection, event_id: EventId, exit_time: f64) -> Result<(), StorageError> {
        conn.execute(
            "UPDATE process_events SET exit_time = ?2 WHERE id = ?1",
            params![event_id.0, exit_time],
        )?;
        Ok(())
    }

    pub fn open_events_for_boot(conn: &Connection, boot_time: i64) -> Result<Vec<OpenEvent>, StorageError> {
        let mut stmt = conn.prepare(
            "SELECT id, pid, command, entry_time, entry_band, peak_score, peak_band
             FROM process_events
             WHERE boot_time = ?1 AND exit_time IS NULL",
        )?;
        let rows = stmt
            .query_map(params![boot_time], |row| {
                Ok(OpenEvent {
                    id: EventId(row.get(0)?),
                    pid: Pid(row.get::<_, i64>(1)?.try_into().unwrap_or(0)),
                    command: row.get(2)?,
                    entry_time: row.get(3)?,
                    entry_band: row.get(4)?,
                    peak_score: row.get::<_, i64>(5)?.try_into().unwrap_or(0),
                    peak_band: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_daemon_state(conn: &Connection, key: &str) -> Result<Option<String>, StorageError> {
        let value = conn
            .query_row("SELECT value FROM daemon_state WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_daemon_state(conn: &Connection, key: &str, value: &str, updated_at: f64) -> Result<(), StorageError> {
        conn.execute(
            "INSERT INTO daemon_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, updated_at],
        )?;
        Ok(())
    }

    pub fn prune_events_older_than(conn: &Connection, cutoff_entry_time: f64) -> Result<usize, StorageError> {
        let changed = conn.execute(
            "DELETE FROM process_events WHERE exit_time IS NOT NULL AND entry_time < ?1",
            params![cutoff_entry_time],
        )?;
        Ok(changed)
    }

    pub fn integrity_check(conn: &Connection) -> Result<(), StorageError> {
        let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if result == "ok" {
            Ok(())
        } else {
            Err(StorageError::IntegrityCheckFailed(result))
        }
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Opens (creating or wiping-and-recreating as needed) the database at
/// `path`, applies pragmas, and returns a ready connection.
fn open_and_init(path: &Path) -> Result<Connection, StorageError> {
    if path.exists() {
        let conn = Connection::open(path)?;
        let version = StorageInner::read_schema_version(&conn)?;
        let needs_recreate = version != Some(schema::SCHEMA_VERSION)
            || StorageInner::integrity_check(&conn).is_err();
        drop(conn);
        if needs_recreate {
            log::warn!("schema mismatch or corruption at {}; recreating database", path.display());
            let _ = std::fs::remove_file(path);
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    apply_pragmas(&conn)?;
    if StorageInner::read_schema_version(&conn)?.is_none() {
        StorageInner::create_schema(&conn)?;
    }
    Ok(conn)
}

/// Owns the single writer connection and offloads every call to a
/// blocking thread pool.
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// # Errors
    /// Propagates any I/O or SQLite error encountered opening or
    /// initializing the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = open_and_init(path)?;
        Ok(Storage { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e.to_string())))?
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_process_event(
        &self,
        pid: Pid,
        command: String,
        boot_time: i64,
        entry_time: f64,
        entry_band: String,
        peak_score: u32,
        peak_band: String,
        peak_snapshot_json: String,
    ) -> Result<EventId, StorageError> {
        self.with_conn(move |conn| {
            StorageInner::create_process_event(
                conn, pid, &command, boot_time, entry_time, &entry_band, peak_score, &peak_band, &peak_snapshot_json,
            )
        })
        .await
    }

    pub async fn insert_process_snapshot(
        &self,
        event_id: EventId,
        snapshot_type: String,
        snapshot_json: String,
    ) -> Result<(), StorageError> {
        self.with_conn(move |conn| StorageInner::insert_process_snapshot(conn, event_id, &snapshot_type, &snapshot_json))
            .await
    }

    pub async fn update_process_event_peak(
        &self,
        event_id: EventId,
        peak_score: u32,
        peak_band: String,
        peak_snapshot_json: String,
    ) -> Result<bool, StorageError> {
        self.with_conn(move |conn| {
            StorageInner::update_process_event_peak(conn, event_id, peak_score, &peak_band, &peak_snapshot_json)
        })
        .await
    }

    pub async fn close_process_event(&self, event_id: EventId, exit_time: f64) -> Result<(), StorageError> {
        self.with_conn(move |conn| StorageInner::close_process_event(conn, event_id, exit_time)).await
    }

    pub async fn open_events_for_boot(&self, boot_time: i64) -> Result<Vec<OpenEvent>, StorageError> {
        self.with_conn(move |conn| StorageInner::open_events_for_boot(conn, boot_time)).await
    }

    pub async fn get_daemon_state(&self, key: String) -> Result<Option<String>, StorageError> {
        self.with_conn(move |conn| StorageInner::get_daemon_state(conn, &key)).await
    }

    pub async fn set_daemon_state(&self, key: String, value: String, updated_at: f64) -> Result<(), StorageError> {
        self.with_conn(move |conn| StorageInner::set_daemon_state(conn, &key, &value, updated_at)).await
    }

    pub async fn prune_events_older_than(&self, cutoff_entry_time: f64) -> Result<usize, StorageError> {
        self.with_conn(move |conn| StorageInner::prune_events_older_than(conn, cutoff_entry_time)).await
    }
}

/// Default database file path under the user's data directory.
#[must_use]
pub fn default_db_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("pausewatchd").join("data.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_pragmas(&conn).unwrap();
        StorageInner::create_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn schema_version_is_recorded() {
        let conn = memory_conn();
        assert_eq!(StorageInner::read_schema_version(&conn).unwrap(), Some(schema::SCHEMA_VERSION));
    }

    #[test]
    fn create_and_close_event_round_trips() {
        let conn = memory_conn();
        let id = StorageInner::create_process_event(&conn, Pid(100), "proc", 1000, 0.0, "elevated", 50, "elevated", "{}").unwrap();
        StorageInner::insert_process_snapshot(&conn, id, "entry", "{}").unwrap();
        let open = StorageInner::open_events_for_boot(&conn, 1000).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].pid, Pid(100));

        StorageInner::close_process_event(&conn, id, 5.0).unwrap();
        let open_after = StorageInner::open_events_for_boot(&conn, 1000).unwrap();
        assert!(open_after.is_empty());
    }

    #[test]
    fn update_peak_fails_silently_after_close() {
        let conn = memory_conn();
        let id = StorageInner::create_process_event(&conn, Pid(1), "x", 1, 0.0, "elevated", 50, "elevated", "{}").unwrap();
        StorageInner::close_process_event(&conn, id, 1.0).unwrap();
        let changed = StorageInner::update_process_event_peak(&conn, id, 90, "critical", "{}").unwrap();
        assert!(!changed);
    }

    #[test]
    fn daemon_state_upserts() {
        let conn = memory_conn();
        StorageInner::set_daemon_state(&conn, "last_boot", "1000", 0.0).unwrap();
        StorageInner::set_daemon_state(&conn, "last_boot", "2000", 1.0).unwrap();
        assert_eq!(StorageInner::get_daemon_state(&conn, "last_boot").unwrap(), Some("2000".to_string()));
    }

    #[test]
    fn open_events_scoped_to_boot_time() {
        let conn = memory_conn();
        StorageInner::create_process_event(&conn, Pid(1), "a", 1000, 0.0, "elevated", 50, "elevated", "{}").unwrap();
        StorageInner::create_process_event(&conn, Pid(2), "b", 2000, 0.0, "elevated", 50, "elevated", "{}").unwrap();
        let open_for_old_boot = StorageInner::open_events_for_boot(&conn, 1000).unwrap();
        assert_eq!(open_for_old_boot.len(), 1);
        assert_eq!(open_for_old_boot[0].pid, Pid(1));
    }

    #[test]
    fn prune_only_removes_closed_events_past_cutoff() {
        let conn = memory_conn();
        let old_closed = StorageInner::create_process_event(&conn, Pid(1), "a", 1, 0.0, "elevated", 50, "elevated", "{}").unwrap();
        StorageInner::close_process_event(&conn, old_closed, 1.0).unwrap();
        StorageInner::create_process_event(&conn, Pid(2), "b", 1, 100.0, "elevated", 50, "elevated", "{}").unwrap();
        let still_open = StorageInner::create_process_event(&conn, Pid(3), "c", 1, 0.0, "elevated", 50, "elevated", "{}").unwrap();

        let pruned = StorageInner::prune_events_older_than(&conn, 50.0).unwrap();
        assert_eq!(pruned, 1);
        let remaining_open = StorageInner::open_events_for_boot(&conn, 1).unwrap();
        assert_eq!(remaining_open.len(), 1);
        assert_eq!(remaining_open[0].id, still_open);
    }
}
