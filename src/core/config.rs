//! Configuration system: JSON file + env overrides + conservative defaults.
//!
//! The config is loaded once at startup, validated, and then immutable for
//! the whole run. Invalid configuration refuses the run before any folder is
//! touched.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, UnpackrError};

/// Full unpackr configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Lowercase extensions (with leading dot) counted as videos.
    pub video_extensions: HashSet<String>,
    /// Lowercase extensions counted as music.
    pub music_extensions: HashSet<String>,
    /// Lowercase extensions counted as images.
    pub image_extensions: HashSet<String>,
    /// Lowercase extensions counted as documents.
    pub document_extensions: HashSet<String>,
    /// Extensions that are junk: deletable without further inspection.
    pub removable_extensions: HashSet<String>,
    /// Videos strictly smaller than this are samples and deleted.
    pub min_sample_size_mb: u64,
    /// Music file count at or above which a folder is preserved.
    pub min_music_files: usize,
    /// Image file count threshold for preservation.
    pub min_image_files: usize,
    /// Document count threshold for preservation.
    pub min_documents: usize,
    /// Size floor so thumbnail dirs do not count as image collections.
    pub min_image_folder_bytes: u64,
    /// Hard cap on nested-extraction rounds per folder.
    pub archive_extraction_loop_limit: u32,
    /// Ordered candidate invocation paths per external tool family.
    pub tool_paths: ToolPaths,
    /// Hard wall-clock limit for the whole run, in seconds.
    pub global_runtime_budget_secs: u64,
    /// Suppress all destructive operations while still deciding everything.
    pub dry_run: bool,
    /// Presentation hint consumed by the CLI layer only.
    pub animations: bool,
    /// Presentation hint consumed by the CLI layer only.
    pub color: bool,
}

/// Ordered candidate invocation paths for each external binary.
/// The first candidate that answers a probe invocation wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolPaths {
    pub extractor: Vec<PathBuf>,
    pub parity: Vec<PathBuf>,
    pub probe: Vec<PathBuf>,
    pub decoder: Vec<PathBuf>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            extractor: vec![PathBuf::from("7z"), PathBuf::from("7za")],
            parity: vec![PathBuf::from("par2"), PathBuf::from("par2repair")],
            probe: vec![PathBuf::from("ffprobe")],
            decoder: vec![PathBuf::from("ffmpeg")],
        }
    }
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video_extensions: set(&[
                ".mkv", ".mp4", ".avi", ".m4v", ".mov", ".wmv", ".mpg", ".mpeg", ".ts", ".webm",
            ]),
            music_extensions: set(&[".mp3", ".flac", ".aac", ".ogg", ".m4a", ".wav", ".wma"]),
            image_extensions: set(&[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".tiff"]),
            document_extensions: set(&[".pdf", ".epub", ".mobi", ".azw3", ".cbr", ".cbz"]),
            removable_extensions: set(&[
                ".nfo", ".sfv", ".nzb", ".srr", ".srs", ".url", ".lnk", ".m3u", ".torrent",
            ]),
            min_sample_size_mb: 50,
            min_music_files: 5,
            min_image_files: 10,
            min_documents: 3,
            min_image_folder_bytes: 5 * 1024 * 1024,
            archive_extraction_loop_limit: 3,
            tool_paths: ToolPaths::default(),
            global_runtime_budget_secs: 4 * 3600,
            dry_run: false,
            animations: true,
            color: true,
        }
    }
}

impl Config {
    /// Load from a JSON file, falling back to defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = fs::read_to_string(p).map_err(|source| {
                    if source.kind() == std::io::ErrorKind::NotFound {
                        UnpackrError::MissingConfig {
                            path: p.to_path_buf(),
                        }
                    } else {
                        UnpackrError::io(p, source)
                    }
                })?;
                serde_json::from_str(&raw).map_err(|e| UnpackrError::ConfigParse {
                    context: "config json",
                    details: e.to_string(),
                })?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides, applied after file parsing.
    ///
    /// `UNPACKR_DRY_RUN=1|true` forces dry-run regardless of file content.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("UNPACKR_DRY_RUN") {
            let v = v.to_ascii_lowercase();
            if v == "1" || v == "true" || v == "yes" {
                self.dry_run = true;
            }
        }
    }

    /// Refuse bad values at startup; the run does not begin on error.
    pub fn validate(&self) -> Result<()> {
        for (name, exts) in [
            ("video_extensions", &self.video_extensions),
            ("music_extensions", &self.music_extensions),
            ("image_extensions", &self.image_extensions),
            ("document_extensions", &self.document_extensions),
            ("removable_extensions", &self.removable_extensions),
        ] {
            for ext in exts {
                if !ext.starts_with('.') || ext.len() < 2 {
                    return Err(UnpackrError::InvalidConfig {
                        details: format!("{name}: {ext:?} must start with a dot"),
                    });
                }
                if ext.chars().any(|c| c.is_ascii_uppercase()) {
                    return Err(UnpackrError::InvalidConfig {
                        details: format!("{name}: {ext:?} must be lowercase"),
                    });
                }
            }
        }
        if self.video_extensions.is_empty() {
            return Err(UnpackrError::InvalidConfig {
                details: "video_extensions must not be empty".to_string(),
            });
        }
        if self.archive_extraction_loop_limit == 0 {
            return Err(UnpackrError::InvalidConfig {
                details: "archive_extraction_loop_limit must be at least 1".to_string(),
            });
        }
        if self.global_runtime_budget_secs == 0 {
            return Err(UnpackrError::InvalidConfig {
                details: "global_runtime_budget_secs must be positive".to_string(),
            });
        }
        if self.tool_paths.extractor.is_empty() {
            return Err(UnpackrError::InvalidConfig {
                details: "tool_paths.extractor must list at least one candidate".to_string(),
            });
        }
        Ok(())
    }

    /// Sample threshold in bytes.
    #[must_use]
    pub const fn min_sample_size_bytes(&self) -> u64 {
        self.min_sample_size_mb * 1024 * 1024
    }

    /// Global wall-clock budget as a `Duration`.
    #[must_use]
    pub const fn global_runtime_budget(&self) -> Duration {
        Duration::from_secs(self.global_runtime_budget_secs)
    }
}
