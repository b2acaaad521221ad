//! Executable safety invariants gating every destructive operation.
//!
//! Every `FileOperation` constructed anywhere in the pipeline passes through
//! the single `SafetyEnforcer::execute` entry point. `enforce` evaluates a
//! closed set of predicates (I1–I10); if any fails the operation is refused.
//! Strict mode turns a refusal into a hard failure for the folder; permissive
//! mode logs and skips. In dry-run every predicate is still evaluated and the
//! operation is logged as if it would execute, with the filesystem call
//! replaced by a no-op — that is how dry-run parity with live decisions is
//! achieved.
//!
//! One audit record is emitted per constructed operation, executed or
//! refused.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::core::errors::{Result, UnpackrError};
use crate::core::paths::{is_safe_file_name, is_within, resolve_absolute_path};
use crate::logger::audit::{AuditEvent, AuditLoggerHandle, RecordOutcome, folder_id};
use crate::orchestrator::stats::RunStats;
use crate::pipeline::state::PipelinePhase;

/// Extraction must leave at least this multiple of the archive set's bytes
/// free on the target volume.
pub const EXTRACTION_SPACE_FACTOR: u64 = 3;

// ──────────────────── operations ────────────────────

/// Kind of a destructive filesystem action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    DeleteFile,
    DeleteFolder,
    MoveFile,
    WriteFile,
}

impl OperationKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DeleteFile => "delete-file",
            Self::DeleteFolder => "delete-folder",
            Self::MoveFile => "move-file",
            Self::WriteFile => "write-file",
        }
    }
}

/// Closed enumeration of reasons a destructive operation may carry.
/// Constructing a `FileOperation` without one is impossible (I10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    JunkExtension,
    BelowSampleThreshold,
    ValidationFailedTruncated,
    ValidationFailedCorrupt,
    EmptyAfterProcessing,
    ParityUnrecoverable,
    ExtractionComplete,
    ValidatedVideo,
    ExtractedOutput,
}

impl ReasonCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JunkExtension => "junk-extension",
            Self::BelowSampleThreshold => "below-sample-threshold",
            Self::ValidationFailedTruncated => "validation-failed-truncated",
            Self::ValidationFailedCorrupt => "validation-failed-corrupt",
            Self::EmptyAfterProcessing => "empty-after-processing",
            Self::ParityUnrecoverable => "parity-unrecoverable",
            Self::ExtractionComplete => "extraction-complete",
            Self::ValidatedVideo => "validated-video",
            Self::ExtractedOutput => "extracted-output",
        }
    }
}

/// An intended destructive action, described before it is executed.
/// Never outlives the statement that performs it.
#[derive(Debug, Clone)]
pub struct FileOperation {
    pub kind: OperationKind,
    pub target: PathBuf,
    pub destination: Option<PathBuf>,
    pub reason: ReasonCode,
}

impl FileOperation {
    #[must_use]
    pub fn delete_file(target: impl Into<PathBuf>, reason: ReasonCode) -> Self {
        Self {
            kind: OperationKind::DeleteFile,
            target: target.into(),
            destination: None,
            reason,
        }
    }

    #[must_use]
    pub fn delete_folder(target: impl Into<PathBuf>, reason: ReasonCode) -> Self {
        Self {
            kind: OperationKind::DeleteFolder,
            target: target.into(),
            destination: None,
            reason,
        }
    }

    #[must_use]
    pub fn move_file(
        target: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        reason: ReasonCode,
    ) -> Self {
        Self {
            kind: OperationKind::MoveFile,
            target: target.into(),
            destination: Some(destination.into()),
            reason,
        }
    }

    #[must_use]
    pub fn write_file(destination: impl Into<PathBuf>, reason: ReasonCode) -> Self {
        let destination = destination.into();
        Self {
            kind: OperationKind::WriteFile,
            target: destination.clone(),
            destination: Some(destination),
            reason,
        }
    }
}

// ──────────────────── invariants ────────────────────

/// Identifiers of the closed predicate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvariantId {
    I1Containment,
    I2NoDeleteValidated,
    I3ExtractVerified,
    I4LoopBound,
    I5SpaceBudget,
    I6SafeName,
    I7LegalState,
    I8BoundedSubprocess,
    I9ContainmentSource,
    I10ReasonCoded,
}

impl InvariantId {
    pub const COUNT: usize = 10;

    pub const ALL: [Self; Self::COUNT] = [
        Self::I1Containment,
        Self::I2NoDeleteValidated,
        Self::I3ExtractVerified,
        Self::I4LoopBound,
        Self::I5SpaceBudget,
        Self::I6SafeName,
        Self::I7LegalState,
        Self::I8BoundedSubprocess,
        Self::I9ContainmentSource,
        Self::I10ReasonCoded,
    ];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::I1Containment => "I1",
            Self::I2NoDeleteValidated => "I2",
            Self::I3ExtractVerified => "I3",
            Self::I4LoopBound => "I4",
            Self::I5SpaceBudget => "I5",
            Self::I6SafeName => "I6",
            Self::I7LegalState => "I7",
            Self::I8BoundedSubprocess => "I8",
            Self::I9ContainmentSource => "I9",
            Self::I10ReasonCoded => "I10",
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::I1Containment => 0,
            Self::I2NoDeleteValidated => 1,
            Self::I3ExtractVerified => 2,
            Self::I4LoopBound => 3,
            Self::I5SpaceBudget => 4,
            Self::I6SafeName => 5,
            Self::I7LegalState => 6,
            Self::I8BoundedSubprocess => 7,
            Self::I9ContainmentSource => 8,
            Self::I10ReasonCoded => 9,
        }
    }
}

/// Proof a caller must hold before archive members become deletable (I3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionProof {
    /// Extraction of the set whose first part is named completed with success.
    ExtractionVerified { first_part: PathBuf },
    /// The matching parity set reported the archives unrecoverable.
    ParityUnrecoverable,
}

/// Why an operation was refused.
#[derive(Debug, Clone)]
pub struct Refusal {
    pub invariant: InvariantId,
    pub reason: String,
}

/// Result of routing one operation through the enforcer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    /// Filesystem call ran; for moves, carries the final destination.
    Executed { final_destination: Option<PathBuf> },
    /// Dry-run: decision recorded, no filesystem mutation.
    DryRun,
    /// Refused in permissive mode.
    Refused(InvariantId),
}

impl OpOutcome {
    /// Whether the decision was to act (executed live or counted in dry-run).
    #[must_use]
    pub const fn decided_to_act(&self) -> bool {
        matches!(self, Self::Executed { .. } | Self::DryRun)
    }
}

/// Refusal handling mode. Strict (the default) turns refusals into hard
/// failures for the current folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnforceMode {
    #[default]
    Strict,
    Permissive,
}

/// Per-operation context the predicates evaluate against.
#[derive(Debug, Clone)]
pub struct OpContext<'a> {
    /// Pipeline phase issuing the operation (I7).
    pub phase: PipelinePhase,
    /// Extraction rounds consumed so far for this folder (I4).
    pub extraction_rounds: u32,
    /// Configured round cap (I4).
    pub round_limit: u32,
    /// Global run deadline; operations past it are refused (I4).
    pub deadline: Option<Instant>,
    /// Proof required when deleting archive members (I3).
    pub archive_proof: Option<&'a DeletionProof>,
    /// Whether the target is an archive-set member (I3).
    pub archive_member: bool,
    /// Declared archive-set bytes for extraction writes (I5).
    pub declared_set_bytes: Option<u64>,
    /// Containment root for `WriteFile` (the extraction root). `MoveFile`
    /// is always checked against the destination root.
    pub write_root: Option<&'a Path>,
    /// Paths of videos holding a cached `Pass` verdict (I2).
    pub validated_videos: Option<&'a HashSet<PathBuf>>,
}

impl<'a> OpContext<'a> {
    /// Context with no extraction state and no proofs, for the given phase.
    #[must_use]
    pub const fn for_phase(phase: PipelinePhase) -> Self {
        Self {
            phase,
            extraction_rounds: 0,
            round_limit: u32::MAX,
            deadline: None,
            archive_proof: None,
            archive_member: false,
            declared_set_bytes: None,
            write_root: None,
            validated_videos: None,
        }
    }
}

// ──────────────────── enforcer ────────────────────

/// The single gate between a decision and the filesystem.
pub struct SafetyEnforcer {
    source_root: PathBuf,
    destination_root: PathBuf,
    mode: EnforceMode,
    dry_run: bool,
    privacy: bool,
    logger: Option<AuditLoggerHandle>,
    stats: Arc<RunStats>,
}

impl SafetyEnforcer {
    #[must_use]
    pub fn new(
        source_root: &Path,
        destination_root: &Path,
        mode: EnforceMode,
        dry_run: bool,
        logger: Option<AuditLoggerHandle>,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            source_root: resolve_absolute_path(source_root),
            destination_root: resolve_absolute_path(destination_root),
            mode,
            dry_run,
            privacy: true,
            logger,
            stats,
        }
    }

    /// Disable privacy formatting: audit records carry full paths.
    pub fn set_privacy(&mut self, privacy: bool) {
        self.privacy = privacy;
    }

    /// The configured destination root (normalized).
    #[must_use]
    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    /// The configured source root (normalized).
    #[must_use]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Evaluate every applicable predicate. Pure: no filesystem mutation,
    /// no logging. `execute` is the entry point that records outcomes.
    pub fn enforce(&self, op: &FileOperation, ctx: &OpContext<'_>) -> std::result::Result<(), Refusal> {
        // I10 Reason-Coded: structurally guaranteed by the FileOperation
        // constructors; nothing to evaluate.

        // I7 Legal-State.
        if !ctx.phase.may_issue(op.kind) {
            return Err(Refusal {
                invariant: InvariantId::I7LegalState,
                reason: format!("{} may not issue {}", ctx.phase.name(), op.kind.name()),
            });
        }

        // I4 Loop-Bound.
        if ctx.extraction_rounds > ctx.round_limit {
            return Err(Refusal {
                invariant: InvariantId::I4LoopBound,
                reason: format!(
                    "extraction round {} exceeds limit {}",
                    ctx.extraction_rounds, ctx.round_limit
                ),
            });
        }
        if let Some(deadline) = ctx.deadline
            && Instant::now() >= deadline
        {
            return Err(Refusal {
                invariant: InvariantId::I4LoopBound,
                reason: "global runtime budget exhausted".to_string(),
            });
        }

        match op.kind {
            OperationKind::DeleteFile | OperationKind::DeleteFolder => {
                self.enforce_delete(op, ctx)?;
            }
            OperationKind::MoveFile | OperationKind::WriteFile => {
                self.enforce_write(op, ctx)?;
            }
        }
        Ok(())
    }

    fn enforce_delete(
        &self,
        op: &FileOperation,
        ctx: &OpContext<'_>,
    ) -> std::result::Result<(), Refusal> {
        // I9 Containment-Source.
        if !is_within(&op.target, &self.source_root) {
            return Err(Refusal {
                invariant: InvariantId::I9ContainmentSource,
                reason: "delete target outside source root".to_string(),
            });
        }
        if is_within(&op.target, &self.destination_root) {
            return Err(Refusal {
                invariant: InvariantId::I9ContainmentSource,
                reason: "delete target inside destination root".to_string(),
            });
        }

        // I2 No-Delete-Validated.
        if op.kind == OperationKind::DeleteFile
            && let Some(validated) = ctx.validated_videos
            && validated.contains(&resolve_absolute_path(&op.target))
        {
            return Err(Refusal {
                invariant: InvariantId::I2NoDeleteValidated,
                reason: "target holds a cached Pass verdict".to_string(),
            });
        }

        // I3 Extract-Verified: archive members require proof.
        if op.kind == OperationKind::DeleteFile && ctx.archive_member {
            match (op.reason, ctx.archive_proof) {
                (
                    ReasonCode::ExtractionComplete,
                    Some(DeletionProof::ExtractionVerified { .. }),
                )
                | (ReasonCode::ParityUnrecoverable, Some(DeletionProof::ParityUnrecoverable)) => {}
                _ => {
                    return Err(Refusal {
                        invariant: InvariantId::I3ExtractVerified,
                        reason: "archive member deletion lacks matching proof".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    fn enforce_write(
        &self,
        op: &FileOperation,
        ctx: &OpContext<'_>,
    ) -> std::result::Result<(), Refusal> {
        let Some(destination) = op.destination.as_deref() else {
            return Err(Refusal {
                invariant: InvariantId::I1Containment,
                reason: "operation carries no destination".to_string(),
            });
        };

        // I1 Containment: moves land in the destination root; extraction
        // writes land in their declared extraction root (itself confined to
        // the folder being processed).
        let containment_root: &Path = match op.kind {
            OperationKind::MoveFile => &self.destination_root,
            _ => ctx.write_root.unwrap_or(&self.destination_root),
        };
        if !is_within(destination, containment_root) {
            return Err(Refusal {
                invariant: InvariantId::I1Containment,
                reason: format!(
                    "destination escapes containment root {}",
                    containment_root.display()
                ),
            });
        }

        // I6 Safe-Name.
        let name_ok = destination
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_safe_file_name);
        if !name_ok {
            return Err(Refusal {
                invariant: InvariantId::I6SafeName,
                reason: "unsafe destination file name".to_string(),
            });
        }

        // I5 Space-Budget for extraction writes.
        if op.kind == OperationKind::WriteFile
            && let Some(set_bytes) = ctx.declared_set_bytes
        {
            let required = set_bytes.saturating_mul(EXTRACTION_SPACE_FACTOR);
            match free_space_bytes(destination) {
                Some(free) if free >= required => {}
                Some(free) => {
                    return Err(Refusal {
                        invariant: InvariantId::I5SpaceBudget,
                        reason: format!("free space {free} below required {required}"),
                    });
                }
                // Unknown free space on this platform: the write is additive,
                // not destructive, so the check is skipped rather than failed.
                None => {}
            }
        }

        Ok(())
    }

    /// Route one operation through enforcement, dry-run handling, execution,
    /// and audit emission. Exactly one audit record per call.
    pub fn execute(&self, op: &FileOperation, ctx: &OpContext<'_>) -> Result<OpOutcome> {
        if let Err(refusal) = self.enforce(op, ctx) {
            self.stats.record_refusal(refusal.invariant);
            self.emit(op, ctx, RecordOutcome::Refused, Some(refusal.invariant), Some(refusal.reason.clone()));
            return match self.mode {
                EnforceMode::Strict => Err(UnpackrError::SafetyRefusal {
                    invariant: refusal.invariant.id(),
                    path: op.target.clone(),
                    reason: refusal.reason,
                }),
                EnforceMode::Permissive => Ok(OpOutcome::Refused(refusal.invariant)),
            };
        }

        if self.dry_run {
            self.emit(op, ctx, RecordOutcome::DryRun, None, None);
            return Ok(OpOutcome::DryRun);
        }

        match self.perform(op) {
            Ok(final_destination) => {
                self.emit(op, ctx, RecordOutcome::Executed, None, None);
                Ok(OpOutcome::Executed { final_destination })
            }
            Err(e) => {
                self.emit(op, ctx, RecordOutcome::Failed, None, Some(e.to_string()));
                Err(e)
            }
        }
    }

    fn perform(&self, op: &FileOperation) -> Result<Option<PathBuf>> {
        match op.kind {
            OperationKind::DeleteFile => {
                fs::remove_file(&op.target).map_err(|e| map_io(&op.target, e))?;
                Ok(None)
            }
            OperationKind::DeleteFolder => {
                fs::remove_dir_all(&op.target).map_err(|e| map_io(&op.target, e))?;
                Ok(None)
            }
            OperationKind::MoveFile => {
                let destination = op
                    .destination
                    .as_deref()
                    .ok_or_else(|| UnpackrError::Runtime {
                        details: "move without destination".to_string(),
                    })?;
                let final_dest = unique_destination(destination)?;
                if let Some(parent) = final_dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| map_io(parent, e))?;
                }
                move_file(&op.target, &final_dest)?;
                Ok(Some(final_dest))
            }
            // The external extractor performs the actual writes; the
            // operation exists so the write is gated and audited.
            OperationKind::WriteFile => Ok(op.destination.clone()),
        }
    }

    fn emit(
        &self,
        op: &FileOperation,
        ctx: &OpContext<'_>,
        outcome: RecordOutcome,
        invariant: Option<InvariantId>,
        detail: Option<String>,
    ) {
        let Some(logger) = &self.logger else { return };
        let folder = folder_id(folder_of(&op.target, &self.source_root));
        let target = if self.privacy {
            op.target
                .file_name()
                .map_or_else(|| "?".to_string(), |n| n.to_string_lossy().to_string())
        } else {
            op.target.display().to_string()
        };
        logger.send(AuditEvent::Operation {
            folder,
            phase: ctx.phase.name(),
            kind: op.kind.name(),
            reason: op.reason.as_str(),
            target,
            outcome,
            invariant: invariant.map(InvariantId::id),
            detail,
        });
    }
}

/// The top-level source folder a path belongs to, for audit correlation.
fn folder_of<'a>(path: &'a Path, source_root: &Path) -> &'a Path {
    let mut current = path;
    while let Some(parent) = current.parent() {
        if parent == source_root {
            return current;
        }
        current = parent;
    }
    path
}

fn map_io(path: &Path, e: std::io::Error) -> UnpackrError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        UnpackrError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        UnpackrError::io(path, e)
    }
}

/// Rename, falling back to copy + remove for cross-device moves.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to).map_err(|e| map_io(to, e))?;
            fs::remove_file(from).map_err(|e| map_io(from, e))
        }
    }
}

/// Never overwrite in the destination tree: suffix a counter before the
/// extension until the name is free.
fn unique_destination(destination: &Path) -> Result<PathBuf> {
    if !destination.exists() {
        return Ok(destination.to_path_buf());
    }
    let stem = destination
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().to_string());
    let ext = destination
        .extension()
        .map(|e| e.to_string_lossy().to_string());
    let parent = destination.parent().unwrap_or_else(|| Path::new(""));
    for n in 1..100u32 {
        let name = match &ext {
            Some(ext) => format!("{stem}.{n}.{ext}"),
            None => format!("{stem}.{n}"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(UnpackrError::Runtime {
        details: format!("no free destination name for {}", destination.display()),
    })
}

/// Free bytes on the volume holding `path` (nearest existing ancestor).
#[must_use]
pub fn free_space_bytes(path: &Path) -> Option<u64> {
    #[cfg(unix)]
    {
        let mut probe = Some(path);
        while let Some(p) = probe {
            if p.exists() {
                if let Ok(stat) = nix::sys::statvfs::statvfs(p) {
                    let frsize = u64::try_from(stat.fragment_size()).unwrap_or(0);
                    let avail = u64::try_from(stat.blocks_available()).unwrap_or(0);
                    return Some(frsize.saturating_mul(avail));
                }
                return None;
            }
            probe = p.parent();
        }
        None
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        None
    }
}
