//! Bounded FIFO of the last `ring_buffer_seconds * rate_hz` samples.
//!
//! Owned exclusively by the main loop — no internal locking, per
//! `spec.md` §5. [`RingBuffer::freeze`] returns an owned, immutable copy
//! that can outlive the next `push`.

use crate::model::{RingSample, Sample};
use std::collections::VecDeque;

pub struct RingBuffer {
    capacity: usize,
    entries: VecDeque<RingSample>,
    snapshot_tags: Vec<String>,
}

impl RingBuffer {
    #[must_use]
    pub fn new(ring_buffer_seconds: u32, rate_hz: u32) -> Self {
        let capacity = (u64::from(ring_buffer_seconds) * u64::from(rate_hz.max(1)))
            .try_into()
            .unwrap_or(usize::MAX)
            .max(1);
        RingBuffer { capacity, entries: VecDeque::with_capacity(capacity), snapshot_tags: Vec::new() }
    }

    /// Append a sample, dropping the oldest entry if the buffer is full.
    pub fn push(&mut self, sample: Sample, tier: u32) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(RingSample { tier, sample });
    }

    /// Return an owned, oldest-to-newest copy of every entry currently held.
    #[must_use]
    pub fn freeze(&self) -> Vec<RingSample> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&Sample> {
        self.entries.back().map(|r| &r.sample)
    }

    /// The last `seconds` worth of entries, oldest-to-newest, used to seed
    /// a newly connected client's `initial_state` message.
    #[must_use]
    pub fn last_seconds(&self, seconds: usize) -> Vec<RingSample> {
        let len = self.entries.len();
        let start = len.saturating_sub(seconds);
        self.entries.iter().skip(start).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tag the buffer's current state with `trigger`, marking it as having
    /// fed a forensic snapshot. No I/O of its own — the tracker reads this
    /// tag to correlate its own stored snapshots with the capture that
    /// produced them (`spec.md` §4.7).
    pub fn snapshot_processes(&mut self, trigger: &str) {
        self.snapshot_tags.push(trigger.to_string());
    }

    /// The trigger tags recorded since the last `clear_snapshots()`.
    #[must_use]
    pub fn snapshot_tags(&self) -> &[String] {
        &self.snapshot_tags
    }

    /// Clear all recorded snapshot tags, e.g. once a correlated capture
    /// has finished consuming them.
    pub fn clear_snapshots(&mut self) {
        self.snapshot_tags.clear();
    }
}
