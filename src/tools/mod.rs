//! External tool abstraction: capability traits and resolution.
//!
//! Each tool family is specified by capability (list/extract, repair,
//! probe/decode) rather than by brand. One implementation shells out to a
//! resolved binary through the subprocess runner; the in-process fakes in
//! [`fakes`] implement the same traits for tests. Substitutability is by
//! command path: the first candidate from `tool_paths` that can be spawned
//! wins.

#![allow(missing_docs)]

pub mod fakes;
pub mod system;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::config::Config;
use crate::core::errors::{Result, UnpackrError};
use crate::runner::{SubprocessRunner, ToolInvocation};

/// Captured text of one repair/extract/decode run, for keyword scanning.
#[derive(Debug, Clone)]
pub struct ToolRun {
    /// Conventional exit status: zero means success.
    pub success: bool,
    /// Combined diagnostic text, lowercased.
    pub text: String,
    pub timed_out: bool,
}

/// One entry from an archive listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub symlink: bool,
}

/// Probed media metadata. Fields are `None` when the tool reported nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: Option<f64>,
    pub bitrate_bps: Option<f64>,
}

/// Archive extractor capability: list contents, extract a set.
pub trait ArchiveTool {
    /// List entries of the set anchored at `first_part`.
    fn list(&self, first_part: &Path) -> Result<Vec<ArchiveEntry>>;

    /// Extract the set anchored at `first_part` into `dest`. `set_bytes` is
    /// the declared total size, used for the dynamic timeout.
    fn extract(&self, first_part: &Path, dest: &Path, set_bytes: u64) -> Result<ToolRun>;
}

/// Parity repairer capability.
pub trait ParityTool {
    /// Verify-and-repair against the main index file. `recovery_bytes`
    /// drives the dynamic timeout.
    fn repair(&self, index: &Path, recovery_bytes: u64) -> Result<ToolRun>;
}

/// Media probe/decode capability.
pub trait MediaTool {
    /// Probe container metadata.
    fn probe(&self, video: &Path) -> Result<MediaInfo>;

    /// Decode in null-output mode and capture diagnostics.
    fn decode_check(&self, video: &Path) -> Result<ToolRun>;
}

/// The resolved tool set for one run. The extractor is mandatory; parity and
/// media tools are optional and their absence is handled fail-closed by the
/// pipeline.
pub struct ToolKit {
    pub archive: Box<dyn ArchiveTool>,
    pub parity: Option<Box<dyn ParityTool>>,
    pub media: Option<Box<dyn MediaTool>>,
}

impl std::fmt::Debug for ToolKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolKit")
            .field("archive", &"<dyn ArchiveTool>")
            .field("parity", &self.parity.as_ref().map(|_| "<dyn ParityTool>"))
            .field("media", &self.media.as_ref().map(|_| "<dyn MediaTool>"))
            .finish()
    }
}

impl ToolKit {
    /// Resolve system tools from the configured candidate lists.
    pub fn resolve(config: &Config, runner: &SubprocessRunner) -> Result<Self> {
        let extractor = resolve_candidate(&config.tool_paths.extractor, runner)
            .ok_or(UnpackrError::MissingTool { family: "archive extractor" })?;
        let parity = resolve_candidate(&config.tool_paths.parity, runner);
        let probe = resolve_candidate(&config.tool_paths.probe, runner);
        let decoder = resolve_candidate(&config.tool_paths.decoder, runner);

        Ok(Self {
            archive: Box::new(system::SystemArchiveTool::new(extractor, runner.clone())),
            parity: parity
                .map(|p| Box::new(system::SystemParityTool::new(p, runner.clone())) as Box<dyn ParityTool>),
            media: match (probe, decoder) {
                (Some(probe), Some(decoder)) => Some(Box::new(system::SystemMediaTool::new(
                    probe,
                    decoder,
                    runner.clone(),
                ))),
                _ => None,
            },
        })
    }
}

/// First candidate that can actually be spawned wins. The probe invocation
/// passes `--help`; any exit code counts, only a failed spawn disqualifies.
fn resolve_candidate(candidates: &[PathBuf], runner: &SubprocessRunner) -> Option<PathBuf> {
    for candidate in candidates {
        let invocation = ToolInvocation::new(
            candidate.clone(),
            vec!["--help".to_string()],
            Duration::from_secs(10),
        );
        if runner.run(&invocation).is_ok() {
            return Some(candidate.clone());
        }
    }
    None
}
