//! Structured error types for pausewatchd
//!
//! One enum per subsystem, following the teacher's convention of
//! `thiserror` for `Display` plus `#[from]` chaining into `io`/`serde_json`.

use super::types::{EventId, Pid};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Unreadable { path: String, #[source] source: std::io::Error },

    #[error("scoring.weights must sum to 100, got {sum}")]
    WeightsInvalid { sum: u32 },

    #[error("unknown band name {0:?}")]
    UnknownBand(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("event {0} is already closed")]
    AlreadyClosed(EventId),

    #[error("database integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("failed to spawn `top`: {0}")]
    SpawnFailed(std::io::Error),

    #[error("`top` subprocess exited unexpectedly")]
    EndOfStream,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("capture for {pid} timed out")]
    Timeout { pid: Pid },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SocketError {
    #[error("failed to bind socket at {path}: {source}")]
    BindFailed { path: String, #[source] source: std::io::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_invalid_message() {
        let err = ConfigError::WeightsInvalid { sum: 97 };
        assert!(err.to_string().contains("97"));
    }

    #[test]
    fn already_closed_message() {
        let err = StorageError::AlreadyClosed(EventId(7));
        assert_eq!(err.to_string(), "event event#7 is already closed");
    }
}
