//! Run-scoped statistics, mutated only through atomic adders.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::safety::InvariantId;

/// Counters for one run. Shared freely; every update is a relaxed atomic
/// add, every read a relaxed load. Exact cross-counter ordering is not
/// required — the numbers are reporting, not control flow.
#[derive(Debug, Default)]
pub struct RunStats {
    pub videos_found: AtomicU64,
    pub videos_moved: AtomicU64,
    pub videos_rejected: AtomicU64,
    pub archives_extracted: AtomicU64,
    pub archives_failed: AtomicU64,
    pub parity_ok: AtomicU64,
    pub parity_failed: AtomicU64,
    pub folders_cleaned: AtomicU64,
    pub folders_preserved: AtomicU64,
    pub folders_skipped: AtomicU64,
    pub folders_errored: AtomicU64,
    pub junk_removed: AtomicU64,
    pub bytes_moved: AtomicU64,
    refusals: [AtomicU64; InvariantId::COUNT],
}

/// Immutable snapshot for summaries and the `run_completed` audit record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub videos_found: u64,
    pub videos_moved: u64,
    pub videos_rejected: u64,
    pub archives_extracted: u64,
    pub archives_failed: u64,
    pub parity_ok: u64,
    pub parity_failed: u64,
    pub folders_cleaned: u64,
    pub folders_preserved: u64,
    pub folders_skipped: u64,
    pub folders_errored: u64,
    pub junk_removed: u64,
    pub bytes_moved: u64,
    /// Refused operation counts keyed by invariant id ("I1".."I10").
    pub refusals: Vec<(String, u64)>,
}

impl RunStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one refused operation under its invariant.
    pub fn record_refusal(&self, invariant: InvariantId) {
        self.refusals[invariant.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Total refusals across all invariants.
    pub fn total_refusals(&self) -> u64 {
        self.refusals.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            videos_found: load(&self.videos_found),
            videos_moved: load(&self.videos_moved),
            videos_rejected: load(&self.videos_rejected),
            archives_extracted: load(&self.archives_extracted),
            archives_failed: load(&self.archives_failed),
            parity_ok: load(&self.parity_ok),
            parity_failed: load(&self.parity_failed),
            folders_cleaned: load(&self.folders_cleaned),
            folders_preserved: load(&self.folders_preserved),
            folders_skipped: load(&self.folders_skipped),
            folders_errored: load(&self.folders_errored),
            junk_removed: load(&self.junk_removed),
            bytes_moved: load(&self.bytes_moved),
            refusals: InvariantId::ALL
                .iter()
                .map(|inv| (inv.id().to_string(), load(&self.refusals[inv.index()])))
                .filter(|(_, n)| *n > 0)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = RunStats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.videos_found, 0);
        assert_eq!(snap.bytes_moved, 0);
        assert!(snap.refusals.is_empty());
    }

    #[test]
    fn adders_accumulate() {
        let stats = RunStats::new();
        RunStats::incr(&stats.videos_found);
        RunStats::incr(&stats.videos_found);
        RunStats::add(&stats.bytes_moved, 1024);
        RunStats::add(&stats.bytes_moved, 76);

        let snap = stats.snapshot();
        assert_eq!(snap.videos_found, 2);
        assert_eq!(snap.bytes_moved, 1100);
    }

    #[test]
    fn refusals_keyed_by_invariant() {
        let stats = RunStats::new();
        stats.record_refusal(InvariantId::I1Containment);
        stats.record_refusal(InvariantId::I1Containment);
        stats.record_refusal(InvariantId::I9ContainmentSource);

        let snap = stats.snapshot();
        assert_eq!(snap.refusals.len(), 2);
        assert!(snap.refusals.contains(&("I1".to_string(), 2)));
        assert!(snap.refusals.contains(&("I9".to_string(), 1)));
        assert_eq!(stats.total_refusals(), 3);
    }

    #[test]
    fn snapshot_serializes() {
        let stats = RunStats::new();
        stats.record_refusal(InvariantId::I4LoopBound);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert!(json.get("refusals").is_some());
    }
}
