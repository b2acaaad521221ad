//! Parity engine: group `.par2` files into sets and interpret repair output.
//!
//! Real parity tools frequently print both failure and success phrasing in a
//! single run (a failed repair still reports the files it verified), so the
//! interpretation scans for failure keywords first and lets them dominate —
//! a false "ok" here would authorize deletion of still-broken archives.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::is_parity_file;
use crate::core::errors::Result;
use crate::tools::ParityTool;

/// Failure keywords; any hit makes the result `Unrecoverable` regardless of
/// later success phrasing. Closed list.
const FAILURE_KEYWORDS: [&str; 4] = [
    "repair failed",
    "repair impossible",
    "cannot repair",
    "insufficient",
];

/// Success keywords, consulted only when no failure keyword matched.
/// Closed list.
const SUCCESS_CLEAN: &str = "all files are correct";
const SUCCESS_REPAIRED: &str = "repaired";

/// A group of parity files belonging to one release: main index plus
/// recovery volumes. Constructed during pre-scan, consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParitySet {
    pub index: PathBuf,
    pub volumes: Vec<PathBuf>,
    pub recovery_bytes: u64,
}

impl ParitySet {
    /// Collect the parity set of a folder, if any.
    ///
    /// The main index is the shortest `.par2` name (volume files carry a
    /// `.volNNN+NN` infix that makes them longer); remaining parity files
    /// become companion volumes. Paths are sorted for deterministic logs.
    #[must_use]
    pub fn collect(folder: &Path) -> Option<Self> {
        let mut parity_files: Vec<(PathBuf, u64)> = Vec::new();
        let entries = fs::read_dir(folder).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_parity_file(name) {
                continue;
            }
            let Ok(meta) = fs::symlink_metadata(&path) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            parity_files.push((path, meta.len()));
        }
        if parity_files.is_empty() {
            return None;
        }

        parity_files.sort_by(|a, b| {
            let a_name = a.0.file_name().map_or_else(String::new, |n| n.to_string_lossy().to_string());
            let b_name = b.0.file_name().map_or_else(String::new, |n| n.to_string_lossy().to_string());
            a_name
                .len()
                .cmp(&b_name.len())
                .then_with(|| a_name.cmp(&b_name))
        });

        let recovery_bytes = parity_files.iter().map(|(_, b)| *b).sum();
        let mut iter = parity_files.into_iter().map(|(p, _)| p);
        let index = iter.next()?;
        let mut volumes: Vec<PathBuf> = iter.collect();
        volumes.sort();

        Some(Self {
            index,
            volumes,
            recovery_bytes,
        })
    }

    /// All member paths, index first.
    #[must_use]
    pub fn members(&self) -> Vec<PathBuf> {
        let mut out = Vec::with_capacity(1 + self.volumes.len());
        out.push(self.index.clone());
        out.extend(self.volumes.iter().cloned());
        out
    }
}

/// Interpretation of one verify/repair run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParityOutcome {
    /// All files verified without repair.
    VerifiedClean,
    /// Damage found and repaired.
    Repaired,
    /// Repair is impossible; the protected archives are known-broken.
    Unrecoverable,
    /// Output matched no known phrasing; treat as a soft failure.
    Inconclusive,
}

impl ParityOutcome {
    /// Terminal outcomes leave nothing further for parity to do and permit
    /// folder cleanup (`Unrecoverable` because the broken archives will have
    /// been removed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::VerifiedClean | Self::Repaired | Self::Unrecoverable)
    }
}

/// Scan combined tool output. Failure keywords dominate.
#[must_use]
pub fn interpret_output(text: &str) -> ParityOutcome {
    let lowered = text.to_lowercase();
    if FAILURE_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return ParityOutcome::Unrecoverable;
    }
    if lowered.contains(SUCCESS_CLEAN) {
        return ParityOutcome::VerifiedClean;
    }
    if lowered.contains(SUCCESS_REPAIRED) {
        return ParityOutcome::Repaired;
    }
    ParityOutcome::Inconclusive
}

/// Run the external tool against a parity set and interpret its output.
///
/// `workload_bytes` is the protected data size (archive set bytes plus
/// recovery bytes) and drives the dynamic timeout inside the tool
/// implementation.
pub fn assess(
    tool: &dyn ParityTool,
    set: &ParitySet,
    workload_bytes: u64,
) -> Result<ParityOutcome> {
    let run = tool.repair(&set.index, workload_bytes.saturating_add(set.recovery_bytes))?;
    if run.timed_out {
        return Ok(ParityOutcome::Inconclusive);
    }
    Ok(interpret_output(&run.text))
}
