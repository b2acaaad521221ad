//! Shared fixtures for integration tests: a temp source/dest pair, a tuned
//! config, and a harness that drives one folder through the pipeline with
//! in-process fake tools.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use unpackr::classify::scan_and_classify;
use unpackr::core::config::Config;
use unpackr::logger::audit::{AuditConfig, AuditLoggerHandle, spawn_audit_logger};
use unpackr::orchestrator::stats::RunStats;
use unpackr::pipeline::{FolderReport, PipelineEnv, process_folder};
use unpackr::runner::cancel::CancelToken;
use unpackr::safety::{EnforceMode, SafetyEnforcer};
use unpackr::tools::ToolKit;
use unpackr::tools::fakes::{FakeArchiveTool, FakeMediaTool, FakeParityTool};

pub const MIB: u64 = 1024 * 1024;

pub struct Harness {
    pub tmp: TempDir,
    pub source: PathBuf,
    pub dest: PathBuf,
    pub config: Config,
    pub stats: Arc<RunStats>,
    pub cancel: CancelToken,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        let dest = tmp.path().join("dest");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();

        let config = Config {
            min_sample_size_mb: 5,
            ..Config::default()
        };

        Self {
            tmp,
            source,
            dest,
            config,
            stats: Arc::new(RunStats::new()),
            cancel: CancelToken::new(),
        }
    }

    pub fn folder(&self, name: &str) -> PathBuf {
        let folder = self.source.join(name);
        fs::create_dir_all(&folder).unwrap();
        folder
    }

    pub fn file(&self, folder: &Path, name: &str, bytes: u64) -> PathBuf {
        let path = folder.join(name);
        fs::write(&path, vec![0u8; usize::try_from(bytes).unwrap()]).unwrap();
        path
    }

    pub fn enforcer(&self, dry_run: bool, logger: Option<AuditLoggerHandle>) -> SafetyEnforcer {
        SafetyEnforcer::new(
            &self.source,
            &self.dest,
            EnforceMode::Strict,
            dry_run,
            logger,
            Arc::clone(&self.stats),
        )
    }

    pub fn logger_to(&self, log_path: &Path) -> AuditLoggerHandle {
        spawn_audit_logger(
            "run-test".to_string(),
            AuditConfig {
                path: Some(log_path.to_path_buf()),
            },
        )
    }

    /// Classify one folder and drive it through the pipeline.
    pub fn run_folder(
        &self,
        folder: &Path,
        tools: &ToolKit,
        enforcer: &SafetyEnforcer,
    ) -> FolderReport {
        let inventory = scan_and_classify(folder, &self.config);
        let env = PipelineEnv {
            config: &self.config,
            tools,
            enforcer,
            stats: &self.stats,
            logger: None,
            cancel: &self.cancel,
            deadline: None,
        };
        process_folder(&env, &inventory)
    }

    pub fn dest_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.dest)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

/// A toolkit wired entirely from fakes.
pub fn fake_toolkit(
    archive: FakeArchiveTool,
    parity: Option<FakeParityTool>,
    media: Option<FakeMediaTool>,
) -> ToolKit {
    ToolKit {
        archive: Box::new(archive),
        parity: parity.map(|p| Box::new(p) as _),
        media: media.map(|m| Box::new(m) as _),
    }
}

/// Media fake that reports a healthy long video for `name`.
pub fn healthy_media(name: &str) -> FakeMediaTool {
    // 100 s at 100 kb/s: expected ~1.2 MiB, far below any real file size,
    // so the truncation gate never fires on healthy fixtures.
    FakeMediaTool::new().with_metadata(name, 100.0, 100_000.0)
}
