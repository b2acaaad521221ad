//! In-process fakes implementing the tool capability traits.
//!
//! Used by unit and integration tests to drive the pipeline without any
//! external binary. Fixtures are keyed by file name (not full path) so tests
//! can configure behavior before temp directories exist.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::core::errors::{Result, UnpackrError};
use crate::tools::{ArchiveEntry, ArchiveTool, MediaInfo, MediaTool, ParityTool, ToolRun};

fn key_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().to_string())
}

// ──────────────────── archive ────────────────────

/// Fake extractor: listings and extraction outputs configured per first part.
#[derive(Default)]
pub struct FakeArchiveTool {
    listings: HashMap<String, Vec<ArchiveEntry>>,
    /// Files created on extraction: relative path and size in bytes.
    outputs: HashMap<String, Vec<(String, u64)>>,
    list_failures: HashSet<String>,
    extract_failures: HashSet<String>,
    pub extract_calls: Mutex<Vec<PathBuf>>,
}

impl FakeArchiveTool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure extraction output for a first part; the listing defaults to
    /// the same entry paths.
    #[must_use]
    pub fn with_output(mut self, first_part: &str, files: &[(&str, u64)]) -> Self {
        self.outputs.insert(
            first_part.to_string(),
            files.iter().map(|(p, b)| ((*p).to_string(), *b)).collect(),
        );
        self
    }

    /// Override the listing for a first part (e.g. to inject traversal
    /// entries or symlinks).
    #[must_use]
    pub fn with_listing(mut self, first_part: &str, entries: Vec<ArchiveEntry>) -> Self {
        self.listings.insert(first_part.to_string(), entries);
        self
    }

    #[must_use]
    pub fn failing_list(mut self, first_part: &str) -> Self {
        self.list_failures.insert(first_part.to_string());
        self
    }

    #[must_use]
    pub fn failing_extract(mut self, first_part: &str) -> Self {
        self.extract_failures.insert(first_part.to_string());
        self
    }

    #[must_use]
    pub fn extract_call_count(&self) -> usize {
        self.extract_calls.lock().len()
    }
}

impl ArchiveTool for FakeArchiveTool {
    fn list(&self, first_part: &Path) -> Result<Vec<ArchiveEntry>> {
        let key = key_of(first_part);
        if self.list_failures.contains(&key) {
            return Err(UnpackrError::ToolFailed {
                tool: "fake-extractor".to_string(),
                details: "listing failed".to_string(),
            });
        }
        if let Some(entries) = self.listings.get(&key) {
            return Ok(entries.clone());
        }
        Ok(self
            .outputs
            .get(&key)
            .map(|files| {
                files
                    .iter()
                    .map(|(p, _)| ArchiveEntry {
                        path: p.clone(),
                        symlink: false,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn extract(&self, first_part: &Path, dest: &Path, _set_bytes: u64) -> Result<ToolRun> {
        self.extract_calls.lock().push(first_part.to_path_buf());
        let key = key_of(first_part);
        if self.extract_failures.contains(&key) {
            return Ok(ToolRun {
                success: false,
                text: "cannot open the file as archive".to_string(),
                timed_out: false,
            });
        }
        let Some(files) = self.outputs.get(&key) else {
            return Ok(ToolRun {
                success: true,
                text: "everything is ok".to_string(),
                timed_out: false,
            });
        };
        for (rel, bytes) in files {
            let target = dest.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| UnpackrError::io(parent, e))?;
            }
            let truncated = usize::try_from(*bytes).unwrap_or(usize::MAX);
            fs::write(&target, vec![0u8; truncated]).map_err(|e| UnpackrError::io(&target, e))?;
        }
        Ok(ToolRun {
            success: true,
            text: "everything is ok".to_string(),
            timed_out: false,
        })
    }
}

// ──────────────────── parity ────────────────────

/// Fake parity tool: canned output text per index file name.
#[derive(Default)]
pub struct FakeParityTool {
    outputs: HashMap<String, String>,
    default_output: Option<String>,
    pub repair_calls: Mutex<Vec<PathBuf>>,
}

impl FakeParityTool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output(mut self, index: &str, text: &str) -> Self {
        self.outputs.insert(index.to_string(), text.to_string());
        self
    }

    #[must_use]
    pub fn with_default_output(mut self, text: &str) -> Self {
        self.default_output = Some(text.to_string());
        self
    }

    #[must_use]
    pub fn repair_call_count(&self) -> usize {
        self.repair_calls.lock().len()
    }
}

impl ParityTool for FakeParityTool {
    fn repair(&self, index: &Path, _recovery_bytes: u64) -> Result<ToolRun> {
        self.repair_calls.lock().push(index.to_path_buf());
        let key = key_of(index);
        let text = self
            .outputs
            .get(&key)
            .cloned()
            .or_else(|| self.default_output.clone())
            .unwrap_or_else(|| "all files are correct".to_string());
        let lowered = text.to_lowercase();
        let success = !lowered.contains("repair failed") && !lowered.contains("cannot repair");
        Ok(ToolRun {
            success,
            text: lowered,
            timed_out: false,
        })
    }
}

// ──────────────────── media ────────────────────

/// Fake probe/decoder: metadata and decode diagnostics per video file name.
#[derive(Default)]
pub struct FakeMediaTool {
    info: HashMap<String, MediaInfo>,
    decode_failures: HashMap<String, String>,
}

impl FakeMediaTool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_metadata(mut self, video: &str, duration_secs: f64, bitrate_bps: f64) -> Self {
        self.info.insert(
            video.to_string(),
            MediaInfo {
                duration_secs: Some(duration_secs),
                bitrate_bps: Some(bitrate_bps),
            },
        );
        self
    }

    #[must_use]
    pub fn without_metadata(mut self, video: &str) -> Self {
        self.info.insert(video.to_string(), MediaInfo::default());
        self
    }

    #[must_use]
    pub fn failing_decode(mut self, video: &str, diagnostic: &str) -> Self {
        self.decode_failures
            .insert(video.to_string(), diagnostic.to_string());
        self
    }
}

impl MediaTool for FakeMediaTool {
    fn probe(&self, video: &Path) -> Result<MediaInfo> {
        Ok(self.info.get(&key_of(video)).copied().unwrap_or_default())
    }

    fn decode_check(&self, video: &Path) -> Result<ToolRun> {
        match self.decode_failures.get(&key_of(video)) {
            Some(diag) => Ok(ToolRun {
                success: false,
                text: diag.to_lowercase(),
                timed_out: false,
            }),
            None => Ok(ToolRun {
                success: true,
                text: String::new(),
                timed_out: false,
            }),
        }
    }
}
