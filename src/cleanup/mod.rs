//! Second-chance deletion of transiently undeletable folders.
//!
//! Folders whose delete failed with a retryable error (locks, permissions,
//! busy mounts) are queued and retried in up to three passes with
//! exponentially increasing backoff plus jitter. Eligibility is re-checked
//! immediately before each attempt to defeat the classification-time /
//! delete-time race. Anything still failing after the last pass is reported,
//! never force-deleted. The queue is capped; when full, the oldest entry is
//! dropped so a pathological run cannot grow memory without bound.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;

use crate::classify::is_archive_file;
use crate::core::config::Config;
use crate::core::paths::dotted_extension;
use crate::pipeline::state::PipelinePhase;
use crate::runner::cancel::CancelToken;
use crate::safety::{FileOperation, OpContext, ReasonCode, SafetyEnforcer};

/// Maximum retry passes over the queue.
pub const MAX_RETRY_PASSES: u32 = 3;

/// Queue capacity; oldest entries drop when full.
const QUEUE_CAP: usize = 256;

/// FIFO of folders awaiting a deletion retry.
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: VecDeque<PathBuf>,
    dropped: usize,
}

impl RetryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a folder, dropping the oldest entry when at capacity.
    pub fn push(&mut self, folder: PathBuf) {
        if self.entries.len() >= QUEUE_CAP {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(folder);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped due to the capacity cap.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Result of the retry passes.
#[derive(Debug, Default)]
pub struct RetryReport {
    pub deleted: Vec<PathBuf>,
    /// No longer eligible at re-check time (new content appeared).
    pub skipped: Vec<PathBuf>,
    /// Still undeletable after the final pass; reported, never forced.
    pub still_failing: Vec<PathBuf>,
    pub cancelled: bool,
}

/// Run up to [`MAX_RETRY_PASSES`] over the queue.
///
/// `base_backoff` doubles each pass; a random jitter of up to half the
/// base is added so repeated runs do not hammer a recovering filesystem in
/// lockstep.
pub fn run_retry_passes(
    mut queue: RetryQueue,
    config: &Config,
    enforcer: &SafetyEnforcer,
    cancel: &CancelToken,
    base_backoff: Duration,
) -> RetryReport {
    let mut report = RetryReport::default();
    if queue.is_empty() {
        return report;
    }

    for pass in 0..MAX_RETRY_PASSES {
        if queue.is_empty() {
            break;
        }
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        if pass > 0 {
            std::thread::sleep(backoff_for_pass(base_backoff, pass));
        }

        let mut remaining = VecDeque::new();
        while let Some(folder) = queue.entries.pop_front() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                remaining.push_back(folder);
                continue;
            }
            if !folder.exists() {
                // Someone else finished the job.
                report.deleted.push(folder);
                continue;
            }
            if !eligible_for_deletion(&folder, config) {
                report.skipped.push(folder);
                continue;
            }
            let op = FileOperation::delete_folder(&folder, ReasonCode::EmptyAfterProcessing);
            let ctx = OpContext::for_phase(PipelinePhase::CleanupPhase);
            match enforcer.execute(&op, &ctx) {
                Ok(outcome) if outcome.decided_to_act() => report.deleted.push(folder),
                Ok(_) => report.skipped.push(folder),
                Err(e) if e.is_retryable() => remaining.push_back(folder),
                Err(_) => report.skipped.push(folder),
            }
        }
        queue.entries = remaining;
    }

    report.still_failing = queue.entries.into_iter().collect();
    report
}

/// Exponential backoff with jitter: `base × 2^(pass-1) + rand(0..base/2)`.
fn backoff_for_pass(base: Duration, pass: u32) -> Duration {
    let scaled = base.saturating_mul(1 << (pass - 1));
    let jitter_cap = (base.as_millis() / 2).max(1);
    let jitter = rand::rng().random_range(0..jitter_cap);
    scaled + Duration::from_millis(u64::try_from(jitter).unwrap_or(0))
}

/// Delete-time eligibility: the folder holds no videos and no archive files.
/// Parity terminality was established when the folder was queued; the
/// filesystem state is what must be fresh.
#[must_use]
pub fn eligible_for_deletion(folder: &Path, config: &Config) -> bool {
    tree_clear(folder, config, 4)
}

fn tree_clear(dir: &Path, config: &Config, depth: usize) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            return false;
        };
        if meta.is_dir() {
            if depth == 0 || !tree_clear(&path, config, depth - 1) {
                return false;
            }
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_archive_file(name) {
            return false;
        }
        if dotted_extension(&path).is_some_and(|ext| config.video_extensions.contains(&ext)) {
            return false;
        }
    }
    true
}
