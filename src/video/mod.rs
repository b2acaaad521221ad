//! Video validator: size, sample, metadata, duration, truncation, and
//! decode gates, applied in order.
//!
//! The probe and decode gates are the only slow paths (each invokes a
//! subprocess). When no media tool is available the verdict is `Unknown`,
//! which is fail-closed downstream: the video is neither moved nor deleted,
//! and its folder survives.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{Result, UnpackrError};
use crate::core::paths::dotted_extension;
use crate::tools::{MediaInfo, MediaTool};

/// Anything smaller cannot be a playable video.
pub const MIN_VIDEO_BYTES: u64 = 1024 * 1024;

/// Anything shorter is a stub, not a feature.
pub const MIN_DURATION_SECS: f64 = 10.0;

/// Observed size below this fraction of `duration × bitrate / 8` means the
/// file was cut off mid-transfer.
pub const TRUNCATION_RATIO: f64 = 0.70;

/// Decode diagnostics that condemn a file. Closed list.
const DECODE_FAILURE_KEYWORDS: [&str; 5] = [
    "invalid data",
    "moov atom not found",
    "corrupt",
    "truncated",
    "error while decoding",
];

/// Validation verdict for one candidate video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerdictKind {
    Pass,
    Sample,
    Corrupt,
    Truncated,
    Unknown,
}

/// Verdict with a machine-readable reason code and a human message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub reason: &'static str,
    pub message: String,
}

impl Verdict {
    fn new(kind: VerdictKind, reason: &'static str, message: String) -> Self {
        Self {
            kind,
            reason,
            message,
        }
    }

    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self.kind, VerdictKind::Pass)
    }
}

/// A candidate media file with its probe results and verdict.
#[derive(Debug, Clone)]
pub struct VideoArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_secs: Option<f64>,
    pub bitrate_bps: Option<f64>,
    pub container: String,
    pub verdict: Verdict,
}

/// Validate one video through the ordered gates.
pub fn validate(
    path: &Path,
    size_bytes: u64,
    media: Option<&dyn MediaTool>,
    min_sample_size_bytes: u64,
) -> Result<VideoArtifact> {
    let container = dotted_extension(path).unwrap_or_default();
    let mut artifact = VideoArtifact {
        path: path.to_path_buf(),
        size_bytes,
        duration_secs: None,
        bitrate_bps: None,
        container,
        verdict: Verdict::new(VerdictKind::Unknown, "probe-unavailable", String::new()),
    };

    // 1. Size floor.
    if size_bytes < MIN_VIDEO_BYTES {
        artifact.verdict = Verdict::new(
            VerdictKind::Corrupt,
            "too-small",
            format!("{size_bytes} bytes is below the {MIN_VIDEO_BYTES}-byte floor"),
        );
        return Ok(artifact);
    }

    // 2. Sample floor.
    if size_bytes < min_sample_size_bytes {
        artifact.verdict = Verdict::new(
            VerdictKind::Sample,
            "below-sample-threshold",
            format!("{size_bytes} bytes is below the sample threshold {min_sample_size_bytes}"),
        );
        return Ok(artifact);
    }

    // 3. Metadata probe.
    let Some(media) = media else {
        artifact.verdict = Verdict::new(
            VerdictKind::Unknown,
            "probe-unavailable",
            "no media probe tool available".to_string(),
        );
        return Ok(artifact);
    };
    let info = match media.probe(path) {
        Ok(info) => info,
        Err(UnpackrError::Cancelled) => return Err(UnpackrError::Cancelled),
        // A probe that failed to run tells us nothing about the file;
        // fail closed rather than condemning it.
        Err(_) => {
            artifact.verdict = Verdict::new(
                VerdictKind::Unknown,
                "probe-failed",
                "media probe did not complete".to_string(),
            );
            return Ok(artifact);
        }
    };
    artifact.duration_secs = info.duration_secs;
    artifact.bitrate_bps = info.bitrate_bps;

    let (duration, bitrate) = match positive_metadata(info) {
        Some(pair) => pair,
        None => {
            artifact.verdict = Verdict::new(
                VerdictKind::Corrupt,
                "no-metadata",
                "probe returned no positive duration/bitrate".to_string(),
            );
            return Ok(artifact);
        }
    };

    // 4. Duration floor.
    if duration < MIN_DURATION_SECS {
        artifact.verdict = Verdict::new(
            VerdictKind::Corrupt,
            "too-short",
            format!("duration {duration:.1}s is below {MIN_DURATION_SECS}s"),
        );
        return Ok(artifact);
    }

    // 5. Truncation.
    let expected_bytes = duration * bitrate / 8.0;
    if expected_bytes > 0.0 {
        #[allow(clippy::cast_precision_loss)]
        let ratio = size_bytes as f64 / expected_bytes;
        if ratio < TRUNCATION_RATIO {
            artifact.verdict = Verdict::new(
                VerdictKind::Truncated,
                "validation-failed-truncated",
                format!(
                    "size ratio {ratio:.2} below {TRUNCATION_RATIO} of expected {expected_bytes:.0} bytes"
                ),
            );
            return Ok(artifact);
        }
    }

    // 6. Decode probe.
    let decode = match media.decode_check(path) {
        Ok(run) => run,
        Err(UnpackrError::Cancelled) => return Err(UnpackrError::Cancelled),
        Err(_) => {
            artifact.verdict = Verdict::new(
                VerdictKind::Unknown,
                "decode-unavailable",
                "decode check did not complete".to_string(),
            );
            return Ok(artifact);
        }
    };
    if decode.timed_out {
        artifact.verdict = Verdict::new(
            VerdictKind::Unknown,
            "decode-timeout",
            "decode check timed out".to_string(),
        );
        return Ok(artifact);
    }
    let diagnostic = decode.text.to_lowercase();
    let keyword_hit = DECODE_FAILURE_KEYWORDS
        .iter()
        .find(|kw| diagnostic.contains(*kw));
    if !decode.success || keyword_hit.is_some() {
        artifact.verdict = Verdict::new(
            VerdictKind::Corrupt,
            "decode-failed",
            keyword_hit.map_or_else(
                || "decoder exited with failure".to_string(),
                |kw| format!("decoder diagnostic matched {kw:?}"),
            ),
        );
        return Ok(artifact);
    }

    // 7. All gates passed.
    artifact.verdict = Verdict::new(VerdictKind::Pass, "validated-video", String::new());
    Ok(artifact)
}

fn positive_metadata(info: MediaInfo) -> Option<(f64, f64)> {
    match (info.duration_secs, info.bitrate_bps) {
        (Some(d), Some(b)) if d > 0.0 && b > 0.0 => Some((d, b)),
        _ => None,
    }
}

/// Recursively find video files under `root` (bounded depth), sorted by path
/// for deterministic processing order.
#[must_use]
pub fn find_videos(root: &Path, config: &Config, max_depth: usize) -> Vec<(PathBuf, u64)> {
    let mut found = Vec::new();
    collect_videos(root, config, max_depth, &mut found);
    found.sort();
    found
}

fn collect_videos(dir: &Path, config: &Config, depth: usize, out: &mut Vec<(PathBuf, u64)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.file_type().is_symlink() {
            continue;
        }
        if meta.is_dir() {
            if depth > 0 {
                collect_videos(&path, config, depth - 1, out);
            }
            continue;
        }
        let is_video = dotted_extension(&path)
            .is_some_and(|ext| config.video_extensions.contains(&ext));
        if is_video {
            out.push((path, meta.len()));
        }
    }
}
