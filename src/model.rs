//! The tick-scoped data model: `ProcessMetrics`, `ScoredProcess`, `Sample`.
//!
//! `Event` and `Snapshot` (the persisted counterparts) live in [`crate::storage`].

use crate::domain::{Categories, Pid, SchedState};
use serde::{Deserialize, Serialize};

/// One raw row parsed from a single `top` sample block.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessMetrics {
    pub pid: Pid,
    pub command: String,
    pub cpu_percent: f64,
    pub state: SchedState,
    pub resident_bytes: u64,
    pub compressed_bytes: u64,
    pub pageins: u64,
    pub context_switches: u64,
    pub syscalls_bsd: u64,
    pub threads: u32,
}

/// A `ProcessMetrics` augmented with its computed score and categories.
///
/// Invariants (enforced by [`crate::scorer::score`] and
/// [`crate::selector::select_rogues`], never by this struct's
/// constructor): `0 <= score <= 100`; non-empty `categories`; `stuck`
/// state implies the `stuck` category; `pageins > 0` implies `paging`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredProcess {
    pub pid: u32,
    pub command: String,
    pub cpu_percent: f64,
    pub state: String,
    pub resident_bytes: u64,
    pub compressed_bytes: u64,
    pub pageins: u64,
    pub context_switches: u64,
    pub syscalls_bsd: u64,
    pub threads: u32,
    pub score: u32,
    pub categories: Vec<String>,
    pub captured_at: f64,
}

impl ScoredProcess {
    #[must_use]
    pub fn from_metrics(metrics: &ProcessMetrics, score: u32, categories: &Categories, captured_at: f64) -> Self {
        ScoredProcess {
            pid: metrics.pid.0,
            command: metrics.command.clone(),
            cpu_percent: metrics.cpu_percent,
            state: format!("{:?}", metrics.state).to_lowercase(),
            resident_bytes: metrics.resident_bytes,
            compressed_bytes: metrics.compressed_bytes,
            pageins: metrics.pageins,
            context_switches: metrics.context_switches,
            syscalls_bsd: metrics.syscalls_bsd,
            threads: metrics.threads,
            score,
            categories: categories.iter().map(|c| c.as_str().to_string()).collect(),
            captured_at,
        }
    }
}

/// System-wide load figures from `top`'s preamble, carried alongside the
/// per-process rows (`spec.md` §4.10's `metrics` field).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub load_avg_1m: f64,
    pub load_avg_5m: f64,
    pub load_avg_15m: f64,
}

/// One collector tick: the full observed process count plus the ordered
/// rogue subset selected for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: f64,
    pub process_count: usize,
    pub max_score: u32,
    pub rogue_processes: Vec<ScoredProcess>,
    #[serde(default)]
    pub metrics: SystemMetrics,
}

impl Sample {
    #[must_use]
    pub fn new(timestamp: f64, process_count: usize, rogues: Vec<ScoredProcess>) -> Self {
        let max_score = rogues.iter().map(|p| p.score).max().unwrap_or(0);
        Sample { timestamp, process_count, max_score, rogue_processes: rogues, metrics: SystemMetrics::default() }
    }

    /// Attach system-wide load figures parsed from the same `top` block.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SystemMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

/// A `Sample` tagged with the tick's integer tier, reserved for broadcast
/// protocol compatibility (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingSample {
    pub tier: u32,
    pub sample: Sample,
}
