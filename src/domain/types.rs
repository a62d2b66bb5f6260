//! Domain types providing compile-time safety and self-documentation
//!
//! Newtype wrappers prevent bugs like passing a raw score where a band
//! boundary is expected, and make signatures self-explanatory.

use std::collections::BTreeSet;
use std::fmt;

/// Process ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        Pid(pid)
    }
}

/// OS boot epoch (seconds since the Unix epoch), stable for one boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BootTime(pub i64);

impl fmt::Display for BootTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "boot@{}", self.0)
    }
}

/// Primary key of a `process_events` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// A reduced 0-100 stressor score for one process in one tick.
///
/// Construction is checked: a score outside `0..=100` is an invariant
/// violation the scorer must never produce (see `spec.md` §7), so it
/// panics rather than silently clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score(u8);

impl Score {
    #[must_use]
    pub fn new(value: u32) -> Self {
        assert!(value <= 100, "scorer produced out-of-range score {value}");
        #[allow(clippy::cast_possible_truncation)]
        Score(value as u8)
    }

    #[must_use]
    pub fn value(self) -> u32 {
        u32::from(self.0)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a configured score band (`low`, `medium`, `elevated`, ...).
pub type BandName = String;

/// A reason tag explaining why a process contributed to its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Stuck,
    Paging,
    Cpu,
    Mem,
    Cmprs,
    Pageins,
    Csw,
    Sysbsd,
    Threads,
}

impl Category {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Stuck => "stuck",
            Category::Paging => "paging",
            Category::Cpu => "cpu",
            Category::Mem => "mem",
            Category::Cmprs => "cmprs",
            Category::Pageins => "pageins",
            Category::Csw => "csw",
            Category::Sysbsd => "sysbsd",
            Category::Threads => "threads",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, de-duplicated set of `Category` tags.
pub type Categories = BTreeSet<Category>;

/// Scheduler state of a process as reported by `top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedState {
    Running,
    Sleeping,
    Stuck,
    Uninterruptible,
    Zombie,
    Idle,
    Other,
}

impl SchedState {
    #[must_use]
    pub fn from_top_code(code: &str) -> Self {
        match code.trim() {
            "running" => SchedState::Running,
            "sleeping" => SchedState::Sleeping,
            "stuck" => SchedState::Stuck,
            "uninterruptible" => SchedState::Uninterruptible,
            "zombie" => SchedState::Zombie,
            "idle" => SchedState::Idle,
            _ => SchedState::Other,
        }
    }
}
