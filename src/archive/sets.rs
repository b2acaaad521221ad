//! Archive set grouping by naming convention.
//!
//! Three families are recognized: new-style RAR volumes
//! (`name.partNN.rar`), old-style RAR volumes (`name.rar` + `name.rNN`),
//! and split 7z (`name.7z.NNN`). Anything else with an archive extension is
//! a single-file set. Each set carries its canonical first part — the one
//! member the extractor is pointed at; it pulls the rest itself.
//!
//! An incomplete set (missing members between the first and last part
//! number) is flagged and never passed to the extractor.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::classify::is_archive_file;

static PART_RAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?P<base>.+)\.part(?P<num>\d+)\.rar$").expect("static regex"));
static R_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?P<base>.+)\.r(?P<num>\d{2})$").expect("static regex"));
static SEVENZ_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?P<base>.+\.7z)\.(?P<num>\d{3})$").expect("static regex"));

/// Family of one archive set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFamily {
    RarVolumes,
    SevenZipSplit,
    Single,
}

/// A group of archive files meant to be extracted together.
#[derive(Debug, Clone)]
pub struct ArchiveSet {
    pub family: ArchiveFamily,
    /// Canonical member the extractor is pointed at.
    pub first_part: PathBuf,
    /// All members in part order.
    pub members: Vec<PathBuf>,
    pub total_bytes: u64,
    /// False when part numbers have gaps or the first part is missing.
    pub complete: bool,
}

#[derive(Default)]
struct PendingSet {
    /// part number → (path, bytes)
    parts: BTreeMap<u32, (PathBuf, u64)>,
    /// Old-style main `.rar` for an r-volume group.
    main: Option<(PathBuf, u64)>,
}

/// Group the archive files of one folder into sets, sorted by first-part
/// path for deterministic processing order.
#[must_use]
pub fn collect_sets(folder: &Path) -> Vec<ArchiveSet> {
    let mut part_groups: BTreeMap<String, PendingSet> = BTreeMap::new();
    let mut rvol_groups: BTreeMap<String, PendingSet> = BTreeMap::new();
    let mut split_groups: BTreeMap<String, PendingSet> = BTreeMap::new();
    let mut singles: Vec<(PathBuf, u64)> = Vec::new();

    let Ok(entries) = fs::read_dir(folder) else {
        return Vec::new();
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_archive_file(name) {
            continue;
        }
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let bytes = meta.len();
        let lower = name.to_lowercase();

        if let Some(caps) = PART_RAR.captures(&lower) {
            let base = caps["base"].to_string();
            let num: u32 = caps["num"].parse().unwrap_or(0);
            part_groups
                .entry(base)
                .or_default()
                .parts
                .insert(num, (path, bytes));
        } else if let Some(caps) = SEVENZ_SPLIT.captures(&lower) {
            let base = caps["base"].to_string();
            let num: u32 = caps["num"].parse().unwrap_or(0);
            split_groups
                .entry(base)
                .or_default()
                .parts
                .insert(num, (path, bytes));
        } else if let Some(caps) = R_VOLUME.captures(&lower) {
            let base = caps["base"].to_string();
            let num: u32 = caps["num"].parse().unwrap_or(0);
            rvol_groups
                .entry(base)
                .or_default()
                .parts
                .insert(num, (path, bytes));
        } else if let Some(base) = lower.strip_suffix(".rar") {
            // Either a single RAR or the main file of an r-volume group;
            // resolved after the scan.
            rvol_groups.entry(base.to_string()).or_default().main = Some((path, bytes));
        } else {
            singles.push((path, bytes));
        }
    }

    let mut sets = Vec::new();

    for (_, group) in part_groups {
        sets.push(finish_numbered(group, ArchiveFamily::RarVolumes, 1));
    }
    for (_, group) in split_groups {
        sets.push(finish_numbered(group, ArchiveFamily::SevenZipSplit, 1));
    }
    for (_, group) in rvol_groups {
        if group.parts.is_empty() {
            // Plain `.rar` with no r-volumes: a single-file set.
            if let Some((path, bytes)) = group.main {
                singles.push((path, bytes));
            }
            continue;
        }
        sets.push(finish_r_volumes(group));
    }
    for (path, bytes) in singles {
        sets.push(ArchiveSet {
            family: ArchiveFamily::Single,
            first_part: path.clone(),
            members: vec![path],
            total_bytes: bytes,
            complete: true,
        });
    }

    sets.sort_by(|a, b| a.first_part.cmp(&b.first_part));
    sets
}

/// Finish a `partNN`/`NNN` group: first expected number is `first_num`,
/// numbering must be contiguous.
fn finish_numbered(group: PendingSet, family: ArchiveFamily, first_num: u32) -> ArchiveSet {
    let numbers: Vec<u32> = group.parts.keys().copied().collect();
    let complete = contiguous_from(&numbers, first_num);
    let members: Vec<PathBuf> = group.parts.values().map(|(p, _)| p.clone()).collect();
    let total_bytes = group.parts.values().map(|(_, b)| *b).sum();
    let first_part = members.first().cloned().unwrap_or_default();
    ArchiveSet {
        family,
        first_part,
        members,
        total_bytes,
        complete,
    }
}

/// Old-style volumes: `name.rar` is the canonical first part, `r00..rNN`
/// must be contiguous from zero.
fn finish_r_volumes(group: PendingSet) -> ArchiveSet {
    let numbers: Vec<u32> = group.parts.keys().copied().collect();
    let has_main = group.main.is_some();
    let complete = has_main && contiguous_from(&numbers, 0);

    let mut members = Vec::with_capacity(group.parts.len() + 1);
    let mut total_bytes = 0u64;
    let first_part = match &group.main {
        Some((path, bytes)) => {
            members.push(path.clone());
            total_bytes += bytes;
            path.clone()
        }
        // Main missing: anchor on the lowest volume so the set still has an
        // identity for reporting; it is incomplete and never extracted.
        None => group
            .parts
            .values()
            .next()
            .map(|(p, _)| p.clone())
            .unwrap_or_default(),
    };
    for (path, bytes) in group.parts.values() {
        members.push(path.clone());
        total_bytes += bytes;
    }

    ArchiveSet {
        family: ArchiveFamily::RarVolumes,
        first_part,
        members,
        total_bytes,
        complete,
    }
}

fn contiguous_from(numbers: &[u32], first: u32) -> bool {
    if numbers.first() != Some(&first) {
        return false;
    }
    numbers
        .windows(2)
        .all(|pair| pair[1] == pair[0] + 1)
}
