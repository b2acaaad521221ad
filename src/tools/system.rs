//! System tool implementations: shell out through the subprocess runner.
//!
//! Argument conventions follow the default candidates (7-Zip for archives,
//! par2cmdline for parity, ffprobe/ffmpeg for media), but nothing else in
//! the core depends on a specific brand — output parsing accepts both the
//! structured `-slt` listing format and plain one-path-per-line output.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::core::errors::{Result, UnpackrError};
use crate::runner::{
    PROBE_TIMEOUT, RunOutput, RunStatus, SubprocessRunner, ToolInvocation, extraction_timeout,
    parity_timeout,
};
use crate::tools::{ArchiveEntry, ArchiveTool, MediaInfo, MediaTool, ParityTool, ToolRun};

fn to_tool_run(output: &RunOutput) -> ToolRun {
    ToolRun {
        success: output.status.success(),
        text: output.combined_lower(),
        timed_out: output.status == RunStatus::TimedOut,
    }
}

fn check_terminal(tool: &Path, output: &RunOutput) -> Result<()> {
    match output.status {
        RunStatus::Cancelled => Err(UnpackrError::Cancelled),
        RunStatus::TimedOut => Err(UnpackrError::ToolTimeout {
            tool: tool.display().to_string(),
            secs: output.duration.as_secs(),
        }),
        RunStatus::Exited(_) => Ok(()),
    }
}

// ──────────────────── archive ────────────────────

pub struct SystemArchiveTool {
    program: PathBuf,
    runner: SubprocessRunner,
}

impl SystemArchiveTool {
    #[must_use]
    pub fn new(program: PathBuf, runner: SubprocessRunner) -> Self {
        Self { program, runner }
    }
}

impl ArchiveTool for SystemArchiveTool {
    fn list(&self, first_part: &Path) -> Result<Vec<ArchiveEntry>> {
        let invocation = ToolInvocation::new(
            self.program.clone(),
            vec![
                "l".to_string(),
                "-slt".to_string(),
                "-ba".to_string(),
                first_part.display().to_string(),
            ],
            PROBE_TIMEOUT,
        );
        let output = self.runner.run(&invocation)?;
        check_terminal(&self.program, &output)?;
        if !output.status.success() {
            return Err(UnpackrError::ToolFailed {
                tool: self.program.display().to_string(),
                details: format!("list mode failed: {}", output.stderr.trim()),
            });
        }
        Ok(parse_listing(&output.stdout))
    }

    fn extract(&self, first_part: &Path, dest: &Path, set_bytes: u64) -> Result<ToolRun> {
        let invocation = ToolInvocation::new(
            self.program.clone(),
            vec![
                "x".to_string(),
                "-y".to_string(),
                format!("-o{}", dest.display()),
                first_part.display().to_string(),
            ],
            extraction_timeout(set_bytes),
        );
        let output = self.runner.run(&invocation)?;
        if output.status == RunStatus::Cancelled {
            return Err(UnpackrError::Cancelled);
        }
        Ok(to_tool_run(&output))
    }
}

/// Parse a listing into entries. Accepts 7-Zip `-slt` blocks (`Path = …`,
/// optional `Symlink = …`) and falls back to one-path-per-line output.
fn parse_listing(stdout: &str) -> Vec<ArchiveEntry> {
    let mut entries = Vec::new();
    let mut structured = false;
    let mut current: Option<ArchiveEntry> = None;

    for line in stdout.lines() {
        let line = line.trim_end();
        if let Some(path) = line.strip_prefix("Path = ") {
            structured = true;
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(ArchiveEntry {
                path: path.to_string(),
                symlink: false,
            });
        } else if line.starts_with("Symlink = ")
            && let Some(entry) = current.as_mut()
        {
            entry.symlink = true;
        } else if line.starts_with("Attributes = ")
            && line.ends_with('l')
            && let Some(entry) = current.as_mut()
        {
            entry.symlink = true;
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }

    if structured {
        return entries;
    }

    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| ArchiveEntry {
            path: l.to_string(),
            symlink: false,
        })
        .collect()
}

// ──────────────────── parity ────────────────────

pub struct SystemParityTool {
    program: PathBuf,
    runner: SubprocessRunner,
}

impl SystemParityTool {
    #[must_use]
    pub fn new(program: PathBuf, runner: SubprocessRunner) -> Self {
        Self { program, runner }
    }
}

impl ParityTool for SystemParityTool {
    fn repair(&self, index: &Path, recovery_bytes: u64) -> Result<ToolRun> {
        let cwd = index.parent().map(Path::to_path_buf);
        let mut invocation = ToolInvocation::new(
            self.program.clone(),
            vec!["r".to_string(), index.display().to_string()],
            parity_timeout(recovery_bytes),
        );
        if let Some(cwd) = cwd {
            invocation = invocation.with_cwd(cwd);
        }
        let output = self.runner.run(&invocation)?;
        if output.status == RunStatus::Cancelled {
            return Err(UnpackrError::Cancelled);
        }
        Ok(to_tool_run(&output))
    }
}

// ──────────────────── media ────────────────────

pub struct SystemMediaTool {
    probe_program: PathBuf,
    decode_program: PathBuf,
    runner: SubprocessRunner,
}

impl SystemMediaTool {
    #[must_use]
    pub fn new(probe_program: PathBuf, decode_program: PathBuf, runner: SubprocessRunner) -> Self {
        Self {
            probe_program,
            decode_program,
            runner,
        }
    }
}

impl MediaTool for SystemMediaTool {
    fn probe(&self, video: &Path) -> Result<MediaInfo> {
        let invocation = ToolInvocation::new(
            self.probe_program.clone(),
            vec![
                "-v".to_string(),
                "error".to_string(),
                "-show_entries".to_string(),
                "format=duration,bit_rate".to_string(),
                "-of".to_string(),
                "default=noprint_wrappers=1".to_string(),
                video.display().to_string(),
            ],
            PROBE_TIMEOUT,
        );
        let output = self.runner.run(&invocation)?;
        check_terminal(&self.probe_program, &output)?;
        if !output.status.success() {
            // A probe that exits non-zero reported no usable metadata.
            return Ok(MediaInfo::default());
        }
        Ok(parse_probe(&output.stdout))
    }

    fn decode_check(&self, video: &Path) -> Result<ToolRun> {
        let invocation = ToolInvocation::new(
            self.decode_program.clone(),
            vec![
                "-v".to_string(),
                "error".to_string(),
                "-i".to_string(),
                video.display().to_string(),
                "-f".to_string(),
                "null".to_string(),
                "-".to_string(),
            ],
            PROBE_TIMEOUT,
        );
        let output = self.runner.run(&invocation)?;
        if output.status == RunStatus::Cancelled {
            return Err(UnpackrError::Cancelled);
        }
        Ok(to_tool_run(&output))
    }
}

/// Parse `key=value` probe output for duration and bit rate.
fn parse_probe(stdout: &str) -> MediaInfo {
    let mut info = MediaInfo::default();
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("duration=") {
            info.duration_secs = value.parse::<f64>().ok().filter(|d| d.is_finite());
        } else if let Some(value) = line.strip_prefix("bit_rate=") {
            info.bitrate_bps = value.parse::<f64>().ok().filter(|b| b.is_finite());
        }
    }
    info
}
