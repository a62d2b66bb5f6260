//! Forensics runner: on pause detection or a forensics-band entry, spawns
//! macOS tracing tools and links their output to the event(s) active at
//! that moment (`spec.md` §4.9).

use crate::domain::EventId;
use crate::model::{RingSample, ScoredProcess};
use crate::storage::Storage;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CHILD_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a forensic capture was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Pause,
    ForensicsBandEntry,
}

impl Trigger {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Trigger::Pause => "pause",
            Trigger::ForensicsBandEntry => "forensics_band_entry",
        }
    }
}

/// Tracks which PIDs currently sit at or above the forensics threshold,
/// so the main loop can fire on the rising edge into the band
/// (`spec.md` §4.9(b): "any scored process **enters** the
/// `forensics_band`") instead of re-triggering every tick a process stays
/// elevated. Mirrors `ProcessTracker`'s per-PID membership bookkeeping.
#[derive(Default)]
pub struct ForensicsBandTracker {
    members: HashSet<u32>,
}

impl ForensicsBandTracker {
    /// Update membership for this tick's scored processes and report
    /// whether any PID newly crossed into the band.
    pub fn update(&mut self, scored: &[ScoredProcess], threshold: u32) -> bool {
        let current: HashSet<u32> = scored.iter().filter(|p| p.score >= threshold).map(|p| p.pid).collect();
        let entered = current.iter().any(|pid| !self.members.contains(pid));
        self.members = current;
        entered
    }
}

/// Identify the culprits: the union of the top processes per category
/// from the highest-stress sample in the freeze, deduplicated, top 5.
#[must_use]
pub fn identify_culprits(frozen: &[RingSample]) -> Vec<u32> {
    let Some(worst) = frozen.iter().max_by_key(|r| r.sample.max_score) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut culprits = Vec::new();
    for process in &worst.sample.rogue_processes {
        if seen.insert(process.pid) {
            culprits.push(process.pid);
        }
        if culprits.len() >= 5 {
            break;
        }
    }
    culprits
}

/// Spawn one external tracing tool, bounded by `CHILD_TIMEOUT`, writing
/// its output to `output_path`. Failures (timeout, spawn error, disk
/// full, permission denied) are logged and never propagated — forensic
/// captures are fire-and-forget per `spec.md` §4.9/§5.
async fn run_capture_tool(tool: &str, args: &[&str], output_path: &Path) {
    if let Some(parent) = output_path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            log::warn!("forensics: cannot create {}: {e}", parent.display());
            return;
        }
    }

    let file = match std::fs::File::create(output_path) {
        Ok(f) => f,
        Err(e) => {
            log::warn!("forensics: cannot create {}: {e}", output_path.display());
            return;
        }
    };

    let spawn_result = tokio::process::Command::new(tool)
        .args(args)
        .stdout(std::process::Stdio::from(file))
        .stderr(std::process::Stdio::null())
        .spawn();

    let mut child = match spawn_result {
        Ok(child) => child,
        Err(e) => {
            log::warn!("forensics: failed to spawn {tool}: {e}");
            return;
        }
    };

    match tokio::time::timeout(CHILD_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) if !status.success() => {
            log::warn!("forensics: {tool} exited with {status}");
        }
        Ok(Err(e)) => log::warn!("forensics: error waiting for {tool}: {e}"),
        Err(_) => {
            log::warn!("forensics: {tool} timed out after {CHILD_TIMEOUT:?}; killing");
            let _ = child.kill().await;
        }
        Ok(Ok(_)) => {}
    }
}

/// Best-effort desktop notification. Never blocks the main loop and
/// never fails the capture on error.
async fn notify_user(message: &str) {
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        tokio::process::Command::new("osascript")
            .args(["-e", &format!("display notification {message:?} with title \"pausewatchd\"")])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status(),
    )
    .await;
    if let Ok(Err(e)) = result {
        log::debug!("forensics: notification failed: {e}");
    }
}

/// Run a full forensic capture pass: identify culprits, spawn tracing
/// tools concurrently, link snapshots to every event open at the time of
/// the trigger, and surface a best-effort notification.
pub async fn run_forensics(
    storage: &Storage,
    frozen: &[RingSample],
    open_event_ids: &[EventId],
    trigger: Trigger,
    data_dir: &Path,
    now: f64,
) {
    let culprits = identify_culprits(frozen);
    log::warn!("forensics triggered ({:?}); culprits: {culprits:?}", trigger);

    let event_dir_base: PathBuf = data_dir.join("forensics").join(now.to_string());

    let stacks = run_capture_tool(
        "sample",
        &["1", "1"],
        &event_dir_base.join("sample.out"),
    );
    let trace = run_capture_tool("spindump", &["1", "-file", "-"], &event_dir_base.join("spindump.out"));
    let logs = run_capture_tool(
        "log",
        &["collect", "--last", "30s", "--output"],
        &event_dir_base.join("log.logarchive"),
    );
    let notice = notify_user(&format!("pausewatchd detected a {} event", trigger.tag()));

    tokio::join!(stacks, trace, logs, notice);

    let snapshot_type = trigger.tag().to_string();
    for event_id in open_event_ids {
        let marker = serde_json::json!({ "trigger": trigger.tag(), "at": now }).to_string();
        if let Err(e) = storage.insert_process_snapshot(*event_id, snapshot_type.clone(), marker).await {
            log::warn!("forensics: failed to link snapshot to {event_id}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Sample, ScoredProcess};

    fn scored(pid: u32, score: u32) -> ScoredProcess {
        ScoredProcess {
            pid,
            command: "x".to_string(),
            cpu_percent: 0.0,
            state: "running".to_string(),
            resident_bytes: 0,
            compressed_bytes: 0,
            pageins: 0,
            context_switches: 0,
            syscalls_bsd: 0,
            threads: 1,
            score,
            categories: vec!["cpu".to_string()],
            captured_at: 0.0,
        }
    }

    #[test]
    fn identifies_culprits_from_the_worst_sample() {
        let low = RingSample { tier: 0, sample: Sample::new(1.0, 1, vec![scored(1, 10)]) };
        let high = RingSample { tier: 0, sample: Sample::new(2.0, 1, vec![scored(2, 90), scored(3, 80)]) };
        let culprits = identify_culprits(&[low, high]);
        assert_eq!(culprits, vec![2, 3]);
    }

    #[test]
    fn culprits_are_deduplicated_and_capped_at_5() {
        let rogues: Vec<ScoredProcess> = (1..=8).map(|pid| scored(pid, 100 - pid)).collect();
        let sample = RingSample { tier: 0, sample: Sample::new(1.0, 8, rogues) };
        let culprits = identify_culprits(&[sample]);
        assert_eq!(culprits.len(), 5);
    }

    #[test]
    fn empty_freeze_yields_no_culprits() {
        assert!(identify_culprits(&[]).is_empty());
    }

    #[test]
    fn trigger_tags_match_spec_names() {
        assert_eq!(Trigger::Pause.tag(), "pause");
        assert_eq!(Trigger::ForensicsBandEntry.tag(), "forensics_band_entry");
    }

    #[test]
    fn band_tracker_fires_on_first_entry_only() {
        let mut tracker = ForensicsBandTracker::default();
        assert!(tracker.update(&[scored(1, 90)], 80));
        assert!(!tracker.update(&[scored(1, 95)], 80), "same pid staying in band must not re-fire");
    }

    #[test]
    fn band_tracker_fires_when_a_second_pid_joins() {
        let mut tracker = ForensicsBandTracker::default();
        assert!(tracker.update(&[scored(1, 90)], 80));
        assert!(tracker.update(&[scored(1, 90), scored(2, 85)], 80));
    }

    #[test]
    fn band_tracker_fires_again_after_leaving_and_reentering() {
        let mut tracker = ForensicsBandTracker::default();
        assert!(tracker.update(&[scored(1, 90)], 80));
        assert!(!tracker.update(&[], 80), "leaving the band is not itself a re-entry");
        assert!(tracker.update(&[scored(1, 90)], 80));
    }

    #[test]
    fn band_tracker_stays_quiet_below_threshold() {
        let mut tracker = ForensicsBandTracker::default();
        assert!(!tracker.update(&[scored(1, 10)], 80));
    }
}
