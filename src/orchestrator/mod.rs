//! Run orchestration: pre-scan, ordering, per-folder dispatch, statistics,
//! the global runtime cap, and the post-run retry pass.
//!
//! One orchestration task drives everything; folders are processed strictly
//! one at a time, oldest modification time first, so in-progress downloads
//! at the newest timestamps are least likely to be disturbed.

#![allow(missing_docs)]

pub mod stats;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use std::sync::Arc;

use crate::classify::{FolderClass, FolderInventory, scan_and_classify};
use crate::cleanup::{RetryQueue, run_retry_passes};
use crate::core::config::Config;
use crate::core::errors::{Result, UnpackrError};
use crate::logger::audit::{AuditConfig, AuditEvent, folder_id, spawn_audit_logger};
use crate::orchestrator::stats::{RunStats, StatsSnapshot};
use crate::pipeline::{FolderDisposition, PipelineEnv, process_folder};
use crate::runner::SubprocessRunner;
use crate::runner::cancel::CancelToken;
use crate::safety::{EnforceMode, SafetyEnforcer};
use crate::tools::ToolKit;

/// Base backoff between deletion retry passes.
const RETRY_BASE_BACKOFF: Duration = Duration::from_secs(2);

/// Options resolved from the CLI surface.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Preview: decide everything, mutate nothing.
    pub dry_run: bool,
    /// Print the pre-flight plan and exit before any pipeline work.
    pub plan_only: bool,
    /// Verify the audit trail against the destination after the run.
    pub audit: bool,
    /// JSONL audit stream destination; stderr when absent.
    pub log_file: Option<PathBuf>,
    /// Include raw paths in audit records instead of opaque ids.
    pub no_privacy: bool,
}

/// One folder line in the run summary / plan.
#[derive(Debug, Clone, Serialize)]
pub struct FolderSummary {
    pub folder: String,
    pub class: FolderClass,
    pub disposition: Option<String>,
    pub videos_moved: u64,
    pub soft_failures: Vec<String>,
}

/// Machine-readable result of a whole run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub dry_run: bool,
    pub plan_only: bool,
    pub cancelled: bool,
    pub folders: Vec<FolderSummary>,
    pub stats: StatsSnapshot,
    pub undeletable_folders: Vec<String>,
    pub audit_findings: Vec<String>,
}

impl RunSummary {
    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            crate::runner::cancel::CANCEL_EXIT_CODE
        } else {
            0
        }
    }
}

/// Execute one full run.
pub fn run(config: &Config, options: &RunOptions, cancel: &CancelToken) -> Result<RunSummary> {
    let source = validate_root(&options.source, "source")?;
    let destination = prepare_destination(&options.destination, &source)?;

    let run_id = new_run_id();
    let deadline = Instant::now() + config.global_runtime_budget();
    let dry_run = options.dry_run || config.dry_run;

    // Pre-scan: classify every top-level folder once, oldest first.
    let inventories = pre_scan(&source, config)?;

    if options.plan_only {
        return Ok(plan_summary(run_id, dry_run, &inventories));
    }

    let logger = spawn_audit_logger(
        run_id.clone(),
        AuditConfig {
            path: options.log_file.clone(),
        },
    );
    logger.send(AuditEvent::RunStarted {
        source: source.display().to_string(),
        destination: destination.display().to_string(),
        dry_run,
    });

    let runner = SubprocessRunner::new(cancel.clone()).with_deadline(deadline);
    let tools = match ToolKit::resolve(config, &runner) {
        Ok(tools) => tools,
        Err(e) => {
            logger.send(AuditEvent::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            });
            logger.shutdown();
            return Err(e);
        }
    };

    let stats = Arc::new(RunStats::new());
    let mut enforcer = SafetyEnforcer::new(
        &source,
        &destination,
        EnforceMode::Strict,
        dry_run,
        Some(logger.clone()),
        Arc::clone(&stats),
    );
    enforcer.set_privacy(!options.no_privacy);

    let env = PipelineEnv {
        config,
        tools: &tools,
        enforcer: &enforcer,
        stats: &stats,
        logger: Some(&logger),
        cancel,
        deadline: Some(deadline),
    };

    let mut folders = Vec::with_capacity(inventories.len());
    let mut retry_queue = RetryQueue::new();
    let mut cancelled = false;

    for inventory in &inventories {
        // Cancellation check at every folder boundary.
        if cancel.is_cancelled() || Instant::now() >= deadline {
            cancelled = cancel.is_cancelled();
            break;
        }
        logger.send(AuditEvent::FolderClassified {
            folder: folder_id(&inventory.path),
            class: inventory.class.to_string(),
        });

        if inventory.class == FolderClass::Skip {
            RunStats::incr(&stats.folders_skipped);
            folders.push(FolderSummary {
                folder: folder_id(&inventory.path),
                class: inventory.class,
                disposition: Some("skipped".to_string()),
                videos_moved: 0,
                soft_failures: Vec::new(),
            });
            continue;
        }

        let report = process_folder(&env, inventory);
        if report.retry_delete {
            retry_queue.push(report.path.clone());
        }
        if report.disposition == FolderDisposition::Cancelled {
            cancelled = true;
        }
        folders.push(FolderSummary {
            folder: folder_id(&report.path),
            class: report.class,
            disposition: Some(disposition_label(report.disposition).to_string()),
            videos_moved: report.videos_moved,
            soft_failures: report.soft_failures,
        });
        if cancelled {
            break;
        }
    }

    // Second-chance deletions for transiently locked folders.
    let retry_report = run_retry_passes(retry_queue, config, &enforcer, cancel, RETRY_BASE_BACKOFF);
    let undeletable_folders: Vec<String> = retry_report
        .still_failing
        .iter()
        .map(|p| folder_id(p))
        .collect();
    for _ in &retry_report.deleted {
        RunStats::incr(&stats.folders_cleaned);
    }
    cancelled = cancelled || retry_report.cancelled;

    let audit_findings = if options.audit {
        post_run_audit(options.log_file.as_deref(), &destination)
    } else {
        Vec::new()
    };

    let snapshot = stats.snapshot();
    logger.send(AuditEvent::RunCompleted {
        stats: serde_json::to_value(&snapshot).unwrap_or_default(),
    });
    logger.shutdown();

    Ok(RunSummary {
        run_id,
        dry_run,
        plan_only: false,
        cancelled,
        folders,
        stats: snapshot,
        undeletable_folders,
        audit_findings,
    })
}

/// Classify every top-level source folder, ordered by ascending
/// modification time (path as tie-break for determinism).
fn pre_scan(source: &Path, config: &Config) -> Result<Vec<FolderInventory>> {
    let entries = fs::read_dir(source).map_err(|e| UnpackrError::io(source, e))?;
    let mut inventories = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        // Top-level symlinked directories are not followed.
        if !meta.is_dir() || meta.file_type().is_symlink() {
            continue;
        }
        inventories.push(scan_and_classify(&path, config));
    }
    inventories.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(inventories)
}

fn plan_summary(run_id: String, dry_run: bool, inventories: &[FolderInventory]) -> RunSummary {
    let folders = inventories
        .iter()
        .map(|inv| FolderSummary {
            folder: folder_id(&inv.path),
            class: inv.class,
            disposition: None,
            videos_moved: 0,
            soft_failures: Vec::new(),
        })
        .collect();
    RunSummary {
        run_id,
        dry_run,
        plan_only: true,
        cancelled: false,
        folders,
        stats: RunStats::new().snapshot(),
        undeletable_folders: Vec::new(),
        audit_findings: Vec::new(),
    }
}

fn disposition_label(disposition: FolderDisposition) -> &'static str {
    match disposition {
        FolderDisposition::Deleted => "deleted",
        FolderDisposition::Preserved => "preserved",
        FolderDisposition::Errored => "errored",
        FolderDisposition::Cancelled => "cancelled",
    }
}

fn validate_root(path: &Path, which: &'static str) -> Result<PathBuf> {
    let resolved = crate::core::paths::resolve_absolute_path(path);
    if !resolved.is_dir() {
        return Err(UnpackrError::InvalidConfig {
            details: format!("{which} root {} is not a directory", path.display()),
        });
    }
    Ok(resolved)
}

fn prepare_destination(path: &Path, source: &Path) -> Result<PathBuf> {
    fs::create_dir_all(path).map_err(|e| UnpackrError::io(path, e))?;
    let resolved = crate::core::paths::resolve_absolute_path(path);
    if resolved == *source || resolved.starts_with(source) || source.starts_with(&resolved) {
        return Err(UnpackrError::InvalidConfig {
            details: "source and destination roots must not overlap".to_string(),
        });
    }
    Ok(resolved)
}

fn new_run_id() -> String {
    let now = chrono::Utc::now();
    format!("run-{}-{}", now.format("%Y%m%dT%H%M%S"), std::process::id())
}

/// Post-run audit: every executed `move-file` in the log must have left a
/// file of that name under the destination root.
fn post_run_audit(log_file: Option<&Path>, destination: &Path) -> Vec<String> {
    use crate::logger::audit::{AuditLine, RecordOutcome};

    let Some(log_file) = log_file else {
        return vec!["audit requires --log <file> to re-read the run's records".to_string()];
    };
    let Ok(content) = fs::read_to_string(log_file) else {
        return vec![format!("audit could not read {}", log_file.display())];
    };

    let mut findings = Vec::new();
    for line in content.lines() {
        let Ok(record) = serde_json::from_str::<AuditLine>(line) else {
            continue;
        };
        if record.event != "operation" || record.outcome != Some(RecordOutcome::Executed) {
            continue;
        }
        if record.op.as_deref() != Some("move-file") {
            continue;
        }
        let Some(target) = record.target else {
            continue;
        };
        let name = Path::new(&target)
            .file_name()
            .map_or(target.clone(), |n| n.to_string_lossy().to_string());
        if !destination_contains(destination, &name) {
            findings.push(format!("moved file {name} not found under destination"));
        }
    }
    findings
}

fn destination_contains(destination: &Path, name: &str) -> bool {
    let direct = destination.join(name);
    if direct.exists() {
        return true;
    }
    // Collision suffixing may have renamed it; accept stem matches.
    let stem = Path::new(name)
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().to_string());
    let Ok(entries) = fs::read_dir(destination) else {
        return false;
    };
    entries.flatten().any(|e| {
        e.file_name()
            .to_string_lossy()
            .starts_with(stem.as_str())
    })
}
