//! Audit sink: append-only JSONL records of every pipeline decision.
//!
//! Architecture: a dedicated logger thread owns the writer; all other code
//! sends `AuditEvent` via a bounded crossbeam channel. Non-blocking
//! `try_send()` ensures the pipeline is never blocked by logging
//! back-pressure. Each line is a self-contained JSON object assembled in
//! memory and written with a single `write_all` so tailing processes never
//! see a torn line.
//!
//! In the default privacy mode, records carry an opaque folder id (SHA-256
//! prefix of the folder path) and bare file names instead of raw source
//! paths.

#![allow(missing_docs)]

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bounded channel capacity for audit events.
const CHANNEL_CAPACITY: usize = 1024;

/// Outcome of one recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// The filesystem call ran.
    Executed,
    /// Dry-run: the decision stands, the filesystem call was a no-op.
    DryRun,
    /// An invariant refused the operation.
    Refused,
    /// The filesystem call itself failed.
    Failed,
}

/// Events accepted by the audit logger.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    RunStarted {
        source: String,
        destination: String,
        dry_run: bool,
    },
    FolderClassified {
        folder: String,
        class: String,
    },
    Operation {
        folder: String,
        phase: &'static str,
        kind: &'static str,
        reason: &'static str,
        target: String,
        outcome: RecordOutcome,
        invariant: Option<&'static str>,
        detail: Option<String>,
    },
    PhaseCompleted {
        folder: String,
        phase: &'static str,
        outcome: String,
    },
    ToolInvoked {
        tool: String,
        duration_ms: u64,
        outcome: String,
    },
    RunCompleted {
        stats: serde_json::Value,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel requesting graceful shutdown of the logger thread.
    Shutdown,
}

/// One serialized JSONL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLine {
    pub ts: String,
    pub run_id: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RecordOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invariant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Where the audit stream goes. Privacy formatting (opaque folder ids, bare
/// target names) happens at the emitting site, before events reach the sink.
#[derive(Debug, Clone, Default)]
pub struct AuditConfig {
    /// JSONL file path; `None` writes to stderr.
    pub path: Option<PathBuf>,
}

/// Opaque folder identifier: first 12 hex chars of the SHA-256 of the path.
#[must_use]
pub fn folder_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Cheaply-cloneable handle for sending audit events. Never blocks; events
/// are dropped (and counted) when the channel is full.
#[derive(Clone)]
pub struct AuditLoggerHandle {
    tx: Sender<AuditEvent>,
    dropped: Arc<AtomicU64>,
    join: Arc<Mutex<Option<thread::JoinHandle<()>>>>,
}

impl AuditLoggerHandle {
    pub fn send(&self, event: AuditEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown and wait for the logger thread to finish.
    pub fn shutdown(&self) {
        let _ = self.tx.send(AuditEvent::Shutdown);
        if let Some(handle) = self.join.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the logger thread and return its handle.
#[must_use]
pub fn spawn_audit_logger(run_id: String, config: AuditConfig) -> AuditLoggerHandle {
    let (tx, rx) = bounded(CHANNEL_CAPACITY);
    let join = thread::Builder::new()
        .name("unpackr-audit".to_string())
        .spawn(move || logger_loop(&run_id, &config, &rx))
        .ok();

    AuditLoggerHandle {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
        join: Arc::new(Mutex::new(join)),
    }
}

fn logger_loop(run_id: &str, config: &AuditConfig, rx: &Receiver<AuditEvent>) {
    let mut writer = open_writer(config.path.as_deref());
    while let Ok(event) = rx.recv() {
        if matches!(event, AuditEvent::Shutdown) {
            break;
        }
        let line = render_line(run_id, event);
        write_line(&mut writer, &line);
    }
    if let Sink::File(w) = &mut writer {
        let _ = w.flush();
    }
}

enum Sink {
    File(BufWriter<std::fs::File>),
    Stderr,
}

fn open_writer(path: Option<&Path>) -> Sink {
    match path {
        Some(p) => match OpenOptions::new().create(true).append(true).open(p) {
            Ok(file) => Sink::File(BufWriter::new(file)),
            // Fall back to stderr; the run must never fail for logging.
            Err(_) => Sink::Stderr,
        },
        None => Sink::Stderr,
    }
}

fn write_line(sink: &mut Sink, line: &AuditLine) {
    let Ok(mut json) = serde_json::to_string(line) else {
        return;
    };
    json.push('\n');
    match sink {
        Sink::File(w) => {
            if w.write_all(json.as_bytes()).is_err() {
                let _ = io::stderr().write_all(json.as_bytes());
            } else {
                let _ = w.flush();
            }
        }
        Sink::Stderr => {
            let _ = io::stderr().write_all(json.as_bytes());
        }
    }
}

fn render_line(run_id: &str, event: AuditEvent) -> AuditLine {
    let mut line = AuditLine {
        ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        run_id: run_id.to_string(),
        event: String::new(),
        folder: None,
        phase: None,
        op: None,
        reason: None,
        target: None,
        outcome: None,
        executed: None,
        invariant: None,
        detail: None,
    };
    match event {
        AuditEvent::RunStarted {
            source,
            destination,
            dry_run,
        } => {
            line.event = "run_started".to_string();
            line.detail = Some(format!(
                "source={source} destination={destination} dry_run={dry_run}"
            ));
        }
        AuditEvent::FolderClassified { folder, class } => {
            line.event = "folder_classified".to_string();
            line.folder = Some(folder);
            line.detail = Some(class);
        }
        AuditEvent::Operation {
            folder,
            phase,
            kind,
            reason,
            target,
            outcome,
            invariant,
            detail,
        } => {
            line.event = "operation".to_string();
            line.folder = Some(folder);
            line.phase = Some(phase.to_string());
            line.op = Some(kind.to_string());
            line.reason = Some(reason.to_string());
            line.target = Some(target);
            line.outcome = Some(outcome);
            line.executed = Some(outcome == RecordOutcome::Executed);
            line.invariant = invariant.map(str::to_string);
            line.detail = detail;
        }
        AuditEvent::PhaseCompleted {
            folder,
            phase,
            outcome,
        } => {
            line.event = "phase_completed".to_string();
            line.folder = Some(folder);
            line.phase = Some(phase.to_string());
            line.detail = Some(outcome);
        }
        AuditEvent::ToolInvoked {
            tool,
            duration_ms,
            outcome,
        } => {
            line.event = "tool_invoked".to_string();
            line.detail = Some(format!("{tool} {duration_ms}ms {outcome}"));
        }
        AuditEvent::RunCompleted { stats } => {
            line.event = "run_completed".to_string();
            line.detail = Some(stats.to_string());
        }
        AuditEvent::Error { code, message } => {
            line.event = "error".to_string();
            line.detail = Some(format!("{code}: {message}"));
        }
        AuditEvent::Shutdown => {
            line.event = "shutdown".to_string();
        }
    }
    line
}
