//! Per-PID state machine opening, updating, and closing database-backed
//! events on threshold crossings (`spec.md` §4.8).

use crate::config::Config;
use crate::domain::{BootTime, EventId, Pid};
use crate::model::ScoredProcess;
use crate::storage::Storage;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
struct TrackedEvent {
    event_id: EventId,
    peak_score: u32,
}

/// Tracks the one open event per PID this daemon's current boot knows
/// about. The database is the source of truth; this map is a hot cache
/// repopulated from [`Storage::open_events_for_boot`] at startup.
pub struct ProcessTracker {
    storage: Storage,
    boot_time: BootTime,
    tracked: HashMap<Pid, TrackedEvent>,
}

impl ProcessTracker {
    /// Populate the in-memory map from events still open for `boot_time`.
    /// Events from prior boots are left untouched, per `spec.md` §4.8.
    ///
    /// # Errors
    /// Propagates storage errors from the initial query.
    pub async fn new(storage: Storage, boot_time: BootTime) -> Result<Self, crate::domain::StorageError> {
        let open = storage.open_events_for_boot(boot_time.0).await?;
        let tracked = open
            .into_iter()
            .map(|event| (event.pid, TrackedEvent { event_id: event.id, peak_score: event.peak_score }))
            .collect();
        Ok(ProcessTracker { storage, boot_time, tracked })
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// The event IDs currently open, for linking forensic snapshots to
    /// every event active at the time of a trigger.
    #[must_use]
    pub fn open_event_ids(&self) -> Vec<EventId> {
        self.tracked.values().map(|t| t.event_id).collect()
    }

    /// Apply one tick's scored processes to the state machine, per the
    /// ordered steps in `spec.md` §4.8.
    pub async fn update(&mut self, scores: &[ScoredProcess], config: &Config, now: f64) {
        let Ok(threshold) = config.tracking_threshold() else {
            log::error!("tracking_band {:?} is not a configured band; skipping tracker update", config.bands.tracking_band);
            return;
        };

        let current_pids: HashSet<Pid> = scores.iter().map(|s| Pid(s.pid)).collect();

        let stale: Vec<Pid> = self.tracked.keys().filter(|pid| !current_pids.contains(pid)).copied().collect();
        for pid in stale {
            if let Some(tracked) = self.tracked.get(&pid) {
                match self.storage.close_process_event(tracked.event_id, now).await {
                    Ok(()) => {
                        self.tracked.remove(&pid);
                    }
                    Err(e) => log::warn!("failed to close stale event for {pid}: {e}"),
                }
            }
        }

        for scored in scores {
            let pid = Pid(scored.pid);
            match self.tracked.get(&pid).copied() {
                None if scored.score >= threshold => {
                    self.open_event(pid, scored, config).await;
                }
                Some(tracked) if scored.score >= threshold && scored.score > tracked.peak_score => {
                    self.bump_peak(pid, tracked, scored, config).await;
                }
                Some(tracked) if scored.score < threshold => {
                    self.close_event(pid, tracked, now).await;
                }
                _ => {}
            }
        }
    }

    async fn open_event(&mut self, pid: Pid, scored: &ScoredProcess, config: &Config) {
        let band = config.band_for(scored.score);
        let snapshot = match serde_json::to_string(scored) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("failed to serialize snapshot for {pid}: {e}");
                return;
            }
        };

        match self
            .storage
            .create_process_event(
                pid,
                scored.command.clone(),
                self.boot_time.0,
                scored.captured_at,
                band.clone(),
                scored.score,
                band,
                snapshot.clone(),
            )
            .await
        {
            Ok(event_id) => {
                if let Err(e) = self.storage.insert_process_snapshot(event_id, "entry".to_string(), snapshot).await {
                    log::warn!("failed to insert entry snapshot for {pid}: {e}");
                }
                self.tracked.insert(pid, TrackedEvent { event_id, peak_score: scored.score });
            }
            Err(e) => log::warn!("failed to open event for {pid}: {e}"),
        }
    }

    async fn bump_peak(&mut self, pid: Pid, tracked: TrackedEvent, scored: &ScoredProcess, config: &Config) {
        let band = config.band_for(scored.score);
        let snapshot = match serde_json::to_string(scored) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("failed to serialize peak snapshot for {pid}: {e}");
                return;
            }
        };

        match self
            .storage
            .update_process_event_peak(tracked.event_id, scored.score, band, snapshot.clone())
            .await
        {
            Ok(true) => {
                if let Err(e) =
                    self.storage.insert_process_snapshot(tracked.event_id, "peak".to_string(), snapshot).await
                {
                    log::warn!("failed to insert peak snapshot for {pid}: {e}");
                }
                self.tracked.insert(pid, TrackedEvent { event_id: tracked.event_id, peak_score: scored.score });
            }
            Ok(false) => log::warn!("event {} for {pid} was already closed; skipping peak update", tracked.event_id),
            Err(e) => log::warn!("failed to update peak for {pid}: {e}"),
        }
    }

    async fn close_event(&mut self, pid: Pid, tracked: TrackedEvent, now: f64) {
        match self.storage.close_process_event(tracked.event_id, now).await {
            Ok(()) => {
                self.tracked.remove(&pid);
            }
            Err(e) => log::warn!("failed to close event for {pid}: {e}"),
        }
    }
}
