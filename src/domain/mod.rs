//! Domain model for pausewatchd
//!
//! Core newtypes and per-subsystem error enums shared across the
//! collector, scorer, tracker, storage, forensics, and broadcaster.

pub mod errors;
pub mod types;

pub use errors::{CollectorError, ConfigError, ForensicsError, SocketError, StorageError};
pub use types::{
    BandName, BootTime, Categories, Category, EventId, Pid, SchedState, Score,
};
