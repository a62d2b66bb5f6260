//! Pure rogue selector: decides which rows from one tick qualify for
//! attention and scores exactly those (`spec.md` §4.5).

use crate::config::Config;
use crate::domain::{Pid, SchedState};
use crate::model::{ProcessMetrics, ScoredProcess};
use std::collections::BTreeMap;

/// Numeric factors eligible for the top-3-per-factor inclusion rule.
fn numeric_value(metrics: &ProcessMetrics, factor: &str) -> f64 {
    match factor {
        "cpu" => metrics.cpu_percent,
        #[allow(clippy::cast_precision_loss)]
        "mem" => metrics.resident_bytes as f64,
        #[allow(clippy::cast_precision_loss)]
        "cmprs" => metrics.compressed_bytes as f64,
        "threads" => f64::from(metrics.threads),
        #[allow(clippy::cast_precision_loss)]
        "csw" => metrics.context_switches as f64,
        #[allow(clippy::cast_precision_loss)]
        "sysbsd" => metrics.syscalls_bsd as f64,
        _ => 0.0,
    }
}

const TOP_K_FACTORS: [&str; 6] = ["cpu", "mem", "cmprs", "threads", "csw", "sysbsd"];

/// Select and score the rogue processes for one tick.
///
/// Output is sorted by score descending, ties broken by PID ascending,
/// matching `spec.md` §4.5's determinism requirement.
#[must_use]
pub fn select_rogues(rows: &[ProcessMetrics], config: &Config, captured_at: f64) -> Vec<ScoredProcess> {
    let mut included: BTreeMap<Pid, &ProcessMetrics> = BTreeMap::new();

    for row in rows {
        if row.state == SchedState::Stuck || row.pageins > 0 {
            included.insert(row.pid, row);
        }
    }

    for factor in TOP_K_FACTORS {
        let mut candidates: Vec<&ProcessMetrics> =
            rows.iter().filter(|row| numeric_value(row, factor) > 0.0).collect();
        candidates.sort_by(|a, b| {
            numeric_value(b, factor)
                .partial_cmp(&numeric_value(a, factor))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.pid.0.cmp(&b.pid.0))
        });
        for row in candidates.into_iter().take(3) {
            included.insert(row.pid, row);
        }
    }

    let mut scored: Vec<ScoredProcess> = included
        .into_values()
        .map(|metrics| {
            let (score, categories) = crate::scorer::score(metrics, config);
            ScoredProcess::from_metrics(metrics, score, &categories, captured_at)
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.pid.cmp(&b.pid)));
    scored
}
