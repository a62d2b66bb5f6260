//! SQL schema and the compiled-in schema version (`spec.md` §4.3).

/// Bump whenever the schema changes incompatibly. The daemon never
/// migrates; on a version mismatch it deletes and recreates the database.
pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_SCHEMA_VERSION: &str = "CREATE TABLE schema_version (version INTEGER PRIMARY KEY)";

pub const CREATE_DAEMON_STATE: &str = "
CREATE TABLE daemon_state (
    key TEXT PRIMARY KEY,
    value TEXT,
    updated_at REAL
)";

pub const CREATE_PROCESS_EVENTS: &str = "
CREATE TABLE process_events (
    id INTEGER PRIMARY KEY,
    pid INTEGER NOT NULL,
    command TEXT NOT NULL,
    boot_time INTEGER NOT NULL,
    entry_time REAL NOT NULL,
    exit_time REAL,
    entry_band TEXT NOT NULL,
    peak_band TEXT NOT NULL,
    peak_score INTEGER NOT NULL,
    peak_snapshot TEXT NOT NULL
)";

pub const CREATE_PROCESS_EVENTS_PID_BOOT_INDEX: &str =
    "CREATE INDEX idx_process_events_pid_boot ON process_events (pid, boot_time)";

pub const CREATE_PROCESS_EVENTS_OPEN_INDEX: &str =
    "CREATE INDEX idx_process_events_open ON process_events (exit_time) WHERE exit_time IS NULL";

pub const CREATE_PROCESS_SNAPSHOTS: &str = "
CREATE TABLE process_snapshots (
    id INTEGER PRIMARY KEY,
    event_id INTEGER NOT NULL REFERENCES process_events(id) ON DELETE CASCADE,
    snapshot_type TEXT NOT NULL,
    snapshot TEXT NOT NULL
)";

pub const CREATE_PROCESS_SNAPSHOTS_EVENT_INDEX: &str =
    "CREATE INDEX idx_process_snapshots_event ON process_snapshots (event_id)";
