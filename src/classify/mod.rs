//! Folder inventory scan and classification.
//!
//! One non-recursive directory scan per source folder produces a
//! `FolderInventory`: per-class file counts and byte totals plus the folder's
//! modification time. The classifier then applies an ordered rule list to tag
//! the folder. Junk detection precedes preservation so a folder of stray
//! `.nfo` files is not rescued; preservation precedes release-processing so a
//! music release's cover art is not misread as a video release.
//!
//! Counts and the tag are computed once in the pre-scan and never mutated;
//! the filesystem is re-checked immediately before any destructive action.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::core::config::Config;
use crate::core::errors::{Result, UnpackrError};
use crate::core::paths::dotted_extension;

static RAR_VOLUME_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.r\d{2}$").expect("static regex"));
static SEVENZ_SPLIT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.7z\.\d{3}$").expect("static regex"));

/// Extension class of one file, resolved against the configured sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Video,
    Music,
    Image,
    Document,
    Junk,
    Archive,
    Parity,
    Other,
}

/// Classify a single file name.
///
/// Archive and parity recognition is built in (multi-part naming conventions
/// are not configurable); the five configured extension sets drive the rest.
/// Order matters: a `.rar` listed in `removable_extensions` would still be an
/// archive, because deleting un-extracted archives as junk loses data.
#[must_use]
pub fn classify_file(name: &str, config: &Config) -> FileClass {
    let path = Path::new(name);
    if is_parity_file(name) {
        return FileClass::Parity;
    }
    if is_archive_file(name) {
        return FileClass::Archive;
    }
    let Some(ext) = dotted_extension(path) else {
        return FileClass::Other;
    };
    if config.video_extensions.contains(&ext) {
        FileClass::Video
    } else if config.music_extensions.contains(&ext) {
        FileClass::Music
    } else if config.image_extensions.contains(&ext) {
        FileClass::Image
    } else if config.document_extensions.contains(&ext) {
        FileClass::Document
    } else if config.removable_extensions.contains(&ext) {
        FileClass::Junk
    } else {
        FileClass::Other
    }
}

/// Whether a file name is part of an archive set by naming convention.
#[must_use]
pub fn is_archive_file(name: &str) -> bool {
    if SEVENZ_SPLIT_SUFFIX.is_match(name) {
        return true;
    }
    match dotted_extension(Path::new(name)) {
        Some(ext) => {
            ext == ".rar" || ext == ".7z" || ext == ".zip" || RAR_VOLUME_EXT.is_match(&ext)
        }
        None => false,
    }
}

/// Whether a file name belongs to a parity set.
#[must_use]
pub fn is_parity_file(name: &str) -> bool {
    dotted_extension(Path::new(name)).is_some_and(|ext| ext == ".par2")
}

/// Per-class file counts and byte totals for one folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassTotals {
    pub videos: usize,
    pub music: usize,
    pub images: usize,
    pub documents: usize,
    pub junk: usize,
    pub archives: usize,
    pub parity: usize,
    pub other: usize,
    pub video_bytes: u64,
    pub music_bytes: u64,
    pub image_bytes: u64,
    pub document_bytes: u64,
    pub archive_bytes: u64,
    pub parity_bytes: u64,
}

impl ClassTotals {
    fn record(&mut self, class: FileClass, bytes: u64) {
        match class {
            FileClass::Video => {
                self.videos += 1;
                self.video_bytes += bytes;
            }
            FileClass::Music => {
                self.music += 1;
                self.music_bytes += bytes;
            }
            FileClass::Image => {
                self.images += 1;
                self.image_bytes += bytes;
            }
            FileClass::Document => {
                self.documents += 1;
                self.document_bytes += bytes;
            }
            FileClass::Junk => self.junk += 1,
            FileClass::Archive => {
                self.archives += 1;
                self.archive_bytes += bytes;
            }
            FileClass::Parity => {
                self.parity += 1;
                self.parity_bytes += bytes;
            }
            FileClass::Other => self.other += 1,
        }
    }

    /// Total number of files seen.
    #[must_use]
    pub const fn file_count(&self) -> usize {
        self.videos
            + self.music
            + self.images
            + self.documents
            + self.junk
            + self.archives
            + self.parity
            + self.other
    }
}

/// Classification tag for one source folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FolderClass {
    /// Empty, or composed entirely of removable-extension files.
    Junk,
    /// Met a preservation threshold; never touched.
    PreserveContent,
    /// Contains archives, parity, or videos; run the pipeline.
    ProcessRelease,
    /// Unknown mix or unlistable; do not touch.
    Skip,
}

impl std::fmt::Display for FolderClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Junk => f.write_str("junk"),
            Self::PreserveContent => f.write_str("preserve-content"),
            Self::ProcessRelease => f.write_str("process-release"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

/// Inventory of one top-level source folder, computed at pre-scan time.
#[derive(Debug, Clone)]
pub struct FolderInventory {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub totals: ClassTotals,
    pub subdirectories: usize,
    pub class: FolderClass,
}

/// Scan one folder (non-recursive) and classify it.
///
/// A folder whose contents cannot be listed is classified `Skip`; the error
/// never propagates upward.
pub fn scan_and_classify(path: &Path, config: &Config) -> FolderInventory {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);

    match scan_folder(path, config) {
        Ok((totals, subdirectories)) => {
            let class = classify(&totals, subdirectories, config);
            FolderInventory {
                path: path.to_path_buf(),
                modified,
                totals,
                subdirectories,
                class,
            }
        }
        Err(_) => FolderInventory {
            path: path.to_path_buf(),
            modified,
            totals: ClassTotals::default(),
            subdirectories: 0,
            class: FolderClass::Skip,
        },
    }
}

/// Non-recursive scan: per-class totals and the subdirectory count.
///
/// Symlinks are inspected with `symlink_metadata` and never followed;
/// they count toward no class.
pub fn scan_folder(path: &Path, config: &Config) -> Result<(ClassTotals, usize)> {
    let mut totals = ClassTotals::default();
    let mut subdirectories = 0usize;

    let entries = fs::read_dir(path).map_err(|source| match source.kind() {
        ErrorKind::PermissionDenied => UnpackrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => UnpackrError::io(path, source),
    })?;

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let Ok(meta) = fs::symlink_metadata(entry.path()) else {
            continue;
        };
        if meta.file_type().is_symlink() {
            continue;
        }
        if meta.is_dir() {
            subdirectories += 1;
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            totals.record(FileClass::Other, meta.len());
            continue;
        };
        totals.record(classify_file(name, config), meta.len());
    }

    Ok((totals, subdirectories))
}

/// Ordered tag rules; first match wins.
#[must_use]
pub fn classify(totals: &ClassTotals, subdirectories: usize, config: &Config) -> FolderClass {
    // 1. Empty folder.
    if totals.file_count() == 0 && subdirectories == 0 {
        return FolderClass::Junk;
    }
    // 2. Only removable files (subdirectories disqualify).
    if subdirectories == 0 && totals.file_count() > 0 && totals.junk == totals.file_count() {
        return FolderClass::Junk;
    }
    // 3. Preservation thresholds.
    if totals.music >= config.min_music_files
        || (totals.images >= config.min_image_files
            && totals.image_bytes >= config.min_image_folder_bytes)
        || totals.documents >= config.min_documents
    {
        return FolderClass::PreserveContent;
    }
    // 4. Anything processable.
    if totals.archives > 0 || totals.parity > 0 || totals.videos > 0 {
        return FolderClass::ProcessRelease;
    }
    // 5. Unknown mix.
    FolderClass::Skip
}
