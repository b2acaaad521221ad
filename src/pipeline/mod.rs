//! Per-folder pipeline: parity → extract → validate → move → cleanup.
//!
//! Each release folder runs through the state machine in `state`, guarded at
//! every destructive step by the safety enforcer. Phases report `Ok`,
//! `SoftFail` (continue, mark the folder errored at the end) or `HardFail`
//! (stop immediately); cleanup is entered regardless of earlier soft
//! failures and re-checks its own preconditions against the live filesystem.
//!
//! Dry-run keeps decision parity with live runs: extraction is redirected to
//! a scratch directory so probes and verdicts see real bytes, every file
//! operation is routed through the enforcer as usual, and the cleanup
//! eligibility re-check consults the set of paths whose deletion was already
//! decided this run.

#![allow(missing_docs)]

pub mod state;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::archive::{ArchiveSet, SetOutcome, collect_sets, new_sets_in, process_set};
use crate::classify::{FolderClass, FolderInventory, is_archive_file};
use crate::core::config::Config;
use crate::core::errors::UnpackrError;
use crate::core::paths::{dotted_extension, resolve_absolute_path};
use crate::logger::audit::{AuditEvent, AuditLoggerHandle, folder_id};
use crate::orchestrator::stats::RunStats;
use crate::parity::{ParityOutcome, ParitySet, assess};
use crate::pipeline::state::{PhaseTracker, PipelinePhase};
use crate::runner::cancel::CancelToken;
use crate::safety::{
    DeletionProof, FileOperation, OpContext, ReasonCode, SafetyEnforcer,
};
use crate::tools::ToolKit;
use crate::video::{VerdictKind, find_videos, validate};

/// Depth bound for post-extraction video discovery inside one folder.
const VIDEO_SEARCH_DEPTH: usize = 4;

/// Everything a folder run needs, borrowed from the orchestrator.
pub struct PipelineEnv<'a> {
    pub config: &'a Config,
    pub tools: &'a ToolKit,
    pub enforcer: &'a SafetyEnforcer,
    pub stats: &'a RunStats,
    pub logger: Option<&'a AuditLoggerHandle>,
    pub cancel: &'a CancelToken,
    pub deadline: Option<Instant>,
}

/// Terminal disposition of one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderDisposition {
    Deleted,
    Preserved,
    Errored,
    Cancelled,
}

/// Outcome report for one folder run.
#[derive(Debug)]
pub struct FolderReport {
    pub path: PathBuf,
    pub class: FolderClass,
    pub disposition: FolderDisposition,
    pub parity: Option<ParityOutcome>,
    pub soft_failures: Vec<String>,
    pub videos_moved: u64,
    /// Folder was eligible for deletion but the delete failed transiently;
    /// the orchestrator queues it for the retry pass.
    pub retry_delete: bool,
}

struct FolderRun<'a, 'b> {
    env: &'a PipelineEnv<'b>,
    folder: PathBuf,
    tracker: PhaseTracker,
    soft_failures: Vec<String>,
    /// Proof per extracted set, keyed by first part.
    extracted: Vec<(ArchiveSet, DeletionProof)>,
    /// Paths whose deletion has been decided (executed or dry-run).
    removed: HashSet<PathBuf>,
    /// Videos holding a Pass verdict (I2 cache).
    validated: HashSet<PathBuf>,
    /// Pass-verdict videos pending the move phase: (live path, op path, size).
    movable: Vec<(PathBuf, PathBuf, u64)>,
    /// Videos with an Unknown verdict: left in place, block folder deletion.
    unknown_videos: usize,
    parity: Option<ParityOutcome>,
    parity_proof: Option<DeletionProof>,
    rounds_used: u32,
    videos_moved: u64,
    /// An invariant refused an operation: stop deciding, delete nothing.
    hard_failed: bool,
    /// Folder was eligible but its delete failed transiently.
    retry_delete: bool,
    /// Dry-run scratch extraction root.
    scratch: Option<tempfile::TempDir>,
}

/// Run one classified folder through the pipeline.
pub fn process_folder(env: &PipelineEnv<'_>, inventory: &FolderInventory) -> FolderReport {
    let mut run = FolderRun {
        env,
        folder: inventory.path.clone(),
        tracker: PhaseTracker::new(),
        soft_failures: Vec::new(),
        extracted: Vec::new(),
        removed: HashSet::new(),
        validated: HashSet::new(),
        movable: Vec::new(),
        unknown_videos: 0,
        parity: None,
        parity_proof: None,
        rounds_used: 0,
        videos_moved: 0,
        hard_failed: false,
        retry_delete: false,
        scratch: None,
    };
    let disposition = run.drive(inventory);
    FolderReport {
        path: inventory.path.clone(),
        class: inventory.class,
        disposition,
        parity: run.parity,
        soft_failures: run.soft_failures,
        videos_moved: run.videos_moved,
        retry_delete: run.retry_delete,
    }
}

impl FolderRun<'_, '_> {
    fn drive(&mut self, inventory: &FolderInventory) -> FolderDisposition {
        if self.advance(PipelinePhase::Scanning).is_err()
            || self.advance(PipelinePhase::Classified).is_err()
        {
            return FolderDisposition::Errored;
        }

        match inventory.class {
            FolderClass::PreserveContent => {
                let _ = self.advance(PipelinePhase::Preserved);
                RunStats::incr(&self.env.stats.folders_preserved);
                return FolderDisposition::Preserved;
            }
            FolderClass::Skip => {
                // Skip folders are filtered by the orchestrator; reaching
                // here means nothing to do.
                RunStats::incr(&self.env.stats.folders_skipped);
                return FolderDisposition::Preserved;
            }
            FolderClass::Junk => {
                if self.advance(PipelinePhase::CleanupPhase).is_err() {
                    return FolderDisposition::Errored;
                }
                return self.cleanup_phase();
            }
            FolderClass::ProcessRelease => {}
        }

        // Parity phase.
        if self.check_cancel() {
            return FolderDisposition::Cancelled;
        }
        if self.advance(PipelinePhase::ParityPhase).is_err() {
            return FolderDisposition::Errored;
        }
        let flow = match self.parity_phase(inventory) {
            PhaseStep::Continue(flow) => flow,
            PhaseStep::Cancelled => return FolderDisposition::Cancelled,
        };
        self.emit_phase(PipelinePhase::ParityPhase);

        if flow == ParityFlow::AbortToCleanup {
            // Parity tooling failed: archives stay, nothing downstream may
            // delete on the strength of this folder's outcome.
            if self.advance(PipelinePhase::CleanupPhase).is_err() {
                return FolderDisposition::Errored;
            }
            return self.cleanup_phase();
        }

        // Extract phase. With unrecoverable parity the archives are
        // known-broken: the phase is passed through without attempting
        // extraction, and cleanup removes the members.
        if self.check_cancel() {
            return FolderDisposition::Cancelled;
        }
        if self.advance(PipelinePhase::ExtractPhase).is_err() {
            return FolderDisposition::Errored;
        }
        if flow == ParityFlow::Proceed {
            match self.extract_phase() {
                PhaseStep::Continue(()) => {}
                PhaseStep::Cancelled => return FolderDisposition::Cancelled,
            }
        }
        self.emit_phase(PipelinePhase::ExtractPhase);
        if self.hard_failed {
            if self.advance(PipelinePhase::CleanupPhase).is_err() {
                return FolderDisposition::Errored;
            }
            return self.cleanup_phase();
        }

        // Validate phase.
        if self.check_cancel() {
            return FolderDisposition::Cancelled;
        }
        if self.advance(PipelinePhase::ValidatePhase).is_err() {
            return FolderDisposition::Errored;
        }
        match self.validate_phase() {
            PhaseStep::Continue(()) => {}
            PhaseStep::Cancelled => return FolderDisposition::Cancelled,
        }
        self.emit_phase(PipelinePhase::ValidatePhase);

        // Move phase, only with at least one Pass verdict.
        if !self.movable.is_empty() && !self.hard_failed {
            if self.check_cancel() {
                return FolderDisposition::Cancelled;
            }
            if self.advance(PipelinePhase::MovePhase).is_err() {
                return FolderDisposition::Errored;
            }
            match self.move_phase() {
                PhaseStep::Continue(()) => {}
                PhaseStep::Cancelled => return FolderDisposition::Cancelled,
            }
            self.emit_phase(PipelinePhase::MovePhase);
        }

        if self.advance(PipelinePhase::CleanupPhase).is_err() {
            return FolderDisposition::Errored;
        }
        self.cleanup_phase()
    }

    // ──────────────────── phases ────────────────────

    fn parity_phase(&mut self, inventory: &FolderInventory) -> PhaseStep<ParityFlow> {
        let Some(set) = ParitySet::collect(&self.folder) else {
            return PhaseStep::Continue(ParityFlow::Proceed);
        };
        let Some(parity_tool) = self.env.tools.parity.as_deref() else {
            self.soft_fail("parity files present but no parity tool available");
            return PhaseStep::Continue(ParityFlow::AbortToCleanup);
        };

        match assess(parity_tool, &set, inventory.totals.archive_bytes) {
            Ok(ParityOutcome::VerifiedClean) => {
                self.parity = Some(ParityOutcome::VerifiedClean);
                RunStats::incr(&self.env.stats.parity_ok);
                PhaseStep::Continue(ParityFlow::Proceed)
            }
            Ok(ParityOutcome::Repaired) => {
                self.parity = Some(ParityOutcome::Repaired);
                RunStats::incr(&self.env.stats.parity_ok);
                PhaseStep::Continue(ParityFlow::Proceed)
            }
            Ok(ParityOutcome::Unrecoverable) => {
                self.parity = Some(ParityOutcome::Unrecoverable);
                self.parity_proof = Some(DeletionProof::ParityUnrecoverable);
                RunStats::incr(&self.env.stats.parity_failed);
                PhaseStep::Continue(ParityFlow::SkipExtraction)
            }
            Ok(ParityOutcome::Inconclusive) => {
                self.parity = Some(ParityOutcome::Inconclusive);
                self.soft_fail("parity output inconclusive");
                PhaseStep::Continue(ParityFlow::Proceed)
            }
            Err(UnpackrError::Cancelled) => PhaseStep::Cancelled,
            Err(e) => {
                self.parity = Some(ParityOutcome::Inconclusive);
                self.soft_fail(&format!("parity tool failed: {e}"));
                PhaseStep::Continue(ParityFlow::AbortToCleanup)
            }
        }
    }

    fn extract_phase(&mut self) -> PhaseStep<()> {
        let extract_root = match self.extraction_root() {
            Ok(root) => root,
            Err(e) => {
                self.soft_fail(&format!("no extraction scratch available: {e}"));
                return PhaseStep::Continue(());
            }
        };

        let mut pending = collect_sets(&self.folder);
        let mut seen: HashSet<PathBuf> =
            pending.iter().map(|s| s.first_part.clone()).collect();
        let limit = self.env.config.archive_extraction_loop_limit;

        while !pending.is_empty() {
            if self.rounds_used >= limit {
                self.soft_fail("extraction loop limit reached with archives remaining");
                break;
            }
            self.rounds_used += 1;

            for set in std::mem::take(&mut pending) {
                if self.check_cancel() {
                    return PhaseStep::Cancelled;
                }
                let ctx = self.op_context(PipelinePhase::ExtractPhase);
                let outcome = match process_set(
                    self.env.tools.archive.as_ref(),
                    &set,
                    &self.folder,
                    &extract_root,
                    self.env.enforcer,
                    &ctx,
                ) {
                    Ok(outcome) => outcome,
                    Err(UnpackrError::Cancelled) => return PhaseStep::Cancelled,
                    Err(e) => {
                        self.hard_failed = true;
                        self.soft_fail(&format!("extraction hard-failed: {e}"));
                        return PhaseStep::Continue(());
                    }
                };
                match outcome {
                    SetOutcome::Extracted(proof) => {
                        RunStats::incr(&self.env.stats.archives_extracted);
                        self.extracted.push((set, proof));
                    }
                    SetOutcome::Incomplete => {
                        self.soft_fail(&format!(
                            "archive set {} is missing parts",
                            display_name(&set.first_part)
                        ));
                    }
                    SetOutcome::ListingRefused { entry, why } => {
                        RunStats::incr(&self.env.stats.archives_failed);
                        self.soft_fail(&format!(
                            "archive listing refused ({why}): {entry}"
                        ));
                    }
                    SetOutcome::Failed { detail } => {
                        RunStats::incr(&self.env.stats.archives_failed);
                        self.soft_fail(&format!("extraction failed: {detail}"));
                    }
                }
            }

            // Nested archives appear in the extraction root.
            pending = new_sets_in(&extract_root, &seen);
            for set in &pending {
                seen.insert(set.first_part.clone());
            }
        }
        PhaseStep::Continue(())
    }

    fn validate_phase(&mut self) -> PhaseStep<()> {
        let config = self.env.config;
        let mut found = find_videos(&self.folder, config, VIDEO_SEARCH_DEPTH);
        if let Some(scratch) = &self.scratch {
            found.extend(find_videos(scratch.path(), config, VIDEO_SEARCH_DEPTH));
        }
        // Order by the conceptual in-folder path so dry-run (scratch) and
        // live runs decide in the same sequence.
        let mut videos: Vec<(PathBuf, PathBuf, u64)> = found
            .into_iter()
            .map(|(path, size)| (self.op_path(&path), path, size))
            .collect();
        videos.sort();

        let media = self.env.tools.media.as_deref();
        for (op_path, path, size) in videos {
            if self.check_cancel() {
                return PhaseStep::Cancelled;
            }
            RunStats::incr(&self.env.stats.videos_found);
            let artifact =
                match validate(&path, size, media, config.min_sample_size_bytes()) {
                    Ok(artifact) => artifact,
                    Err(UnpackrError::Cancelled) => return PhaseStep::Cancelled,
                    Err(e) => {
                        self.soft_fail(&format!("validation failed: {e}"));
                        continue;
                    }
                };

            match artifact.verdict.kind {
                VerdictKind::Pass => {
                    self.validated.insert(resolve_absolute_path(&op_path));
                    self.validated.insert(resolve_absolute_path(&path));
                    self.movable.push((path, op_path, size));
                }
                VerdictKind::Sample => {
                    RunStats::incr(&self.env.stats.videos_rejected);
                    self.delete_file(
                        &op_path,
                        ReasonCode::BelowSampleThreshold,
                        PipelinePhase::ValidatePhase,
                        false,
                    );
                }
                VerdictKind::Truncated => {
                    RunStats::incr(&self.env.stats.videos_rejected);
                    self.delete_file(
                        &op_path,
                        ReasonCode::ValidationFailedTruncated,
                        PipelinePhase::ValidatePhase,
                        false,
                    );
                }
                VerdictKind::Corrupt => {
                    RunStats::incr(&self.env.stats.videos_rejected);
                    self.delete_file(
                        &op_path,
                        ReasonCode::ValidationFailedCorrupt,
                        PipelinePhase::ValidatePhase,
                        false,
                    );
                }
                VerdictKind::Unknown => {
                    // Fail-closed: not moved, not deleted, folder survives.
                    self.unknown_videos += 1;
                }
            }
        }
        PhaseStep::Continue(())
    }

    fn move_phase(&mut self) -> PhaseStep<()> {
        let destination_root = self.env.enforcer.destination_root().to_path_buf();
        for (live_path, op_path, size) in std::mem::take(&mut self.movable) {
            if self.check_cancel() {
                return PhaseStep::Cancelled;
            }
            let Some(file_name) = op_path.file_name() else {
                continue;
            };
            let destination = destination_root.join(file_name);
            // The op names the conceptual source path; in live mode that is
            // also where the bytes are.
            let source = if self.env.config.dry_run { &op_path } else { &live_path };
            let op = FileOperation::move_file(source, &destination, ReasonCode::ValidatedVideo);
            let ctx = self.op_context(PipelinePhase::MovePhase);
            match self.env.enforcer.execute(&op, &ctx) {
                Ok(outcome) if outcome.decided_to_act() => {
                    self.videos_moved += 1;
                    RunStats::incr(&self.env.stats.videos_moved);
                    RunStats::add(&self.env.stats.bytes_moved, size);
                    self.removed.insert(resolve_absolute_path(&op_path));
                }
                Ok(_) => self.soft_fail("move refused"),
                Err(e) => {
                    if matches!(e, UnpackrError::SafetyRefusal { .. }) {
                        self.hard_failed = true;
                    }
                    self.soft_fail(&format!("move failed: {e}"));
                    if self.hard_failed {
                        return PhaseStep::Continue(());
                    }
                }
            }
        }
        PhaseStep::Continue(())
    }

    fn cleanup_phase(&mut self) -> FolderDisposition {
        if self.hard_failed {
            // An invariant refused something earlier; nothing in this
            // folder may be deleted on the strength of this run.
            self.emit_phase(PipelinePhase::CleanupPhase);
            let _ = self.advance(PipelinePhase::Errored);
            RunStats::incr(&self.env.stats.folders_errored);
            return FolderDisposition::Errored;
        }

        // Archive members whose sets resolved terminally are deletable now.
        let extracted = std::mem::take(&mut self.extracted);
        for (set, proof) in &extracted {
            for member in &set.members {
                self.delete_archive_member(member, ReasonCode::ExtractionComplete, proof);
            }
        }
        if let Some(proof) = self.parity_proof.clone() {
            // Parity declared the archives unrecoverable; they are
            // known-broken and removed without extraction.
            for set in collect_sets(&self.folder) {
                for member in &set.members {
                    self.delete_archive_member(member, ReasonCode::ParityUnrecoverable, &proof);
                }
            }
        }

        // Junk removal, only for folders whose processing fully resolved:
        // an errored folder keeps everything it still has.
        let processing_clean = self.soft_failures.is_empty();
        if processing_clean {
            for junk in self.junk_files() {
                if self.delete_file(
                    &junk,
                    ReasonCode::JunkExtension,
                    PipelinePhase::CleanupPhase,
                    false,
                ) {
                    RunStats::incr(&self.env.stats.junk_removed);
                }
            }
        }

        // Folder deletion, eligibility re-checked against the live tree.
        let parity_terminal = self.parity.is_none_or(ParityOutcome::is_terminal);
        let eligible = processing_clean
            && self.unknown_videos == 0
            && parity_terminal
            && self.folder_clear_of_videos_and_archives();

        if eligible {
            let op = FileOperation::delete_folder(&self.folder, ReasonCode::EmptyAfterProcessing);
            let ctx = self.op_context(PipelinePhase::CleanupPhase);
            match self.env.enforcer.execute(&op, &ctx) {
                Ok(outcome) if outcome.decided_to_act() => {
                    RunStats::incr(&self.env.stats.folders_cleaned);
                    self.emit_phase(PipelinePhase::CleanupPhase);
                    let _ = self.advance(PipelinePhase::Deleted);
                    return FolderDisposition::Deleted;
                }
                Ok(_) => self.soft_fail("folder delete refused"),
                Err(e) if e.is_retryable() => {
                    self.retry_delete = true;
                    self.soft_fail(&format!("folder delete failed transiently: {e}"));
                }
                Err(e) => self.soft_fail(&format!("folder delete failed: {e}")),
            }
        }

        self.emit_phase(PipelinePhase::CleanupPhase);
        let _ = self.advance(PipelinePhase::Errored);
        RunStats::incr(&self.env.stats.folders_errored);
        FolderDisposition::Errored
    }

    // ──────────────────── helpers ────────────────────

    fn advance(&mut self, next: PipelinePhase) -> Result<(), UnpackrError> {
        self.tracker.advance(next)
    }

    fn check_cancel(&self) -> bool {
        self.env.cancel.is_cancelled()
    }

    fn soft_fail(&mut self, detail: &str) {
        self.soft_failures.push(detail.to_string());
    }

    fn op_context(&self, phase: PipelinePhase) -> OpContext<'_> {
        let mut ctx = OpContext::for_phase(phase);
        ctx.extraction_rounds = self.rounds_used;
        ctx.round_limit = self.env.config.archive_extraction_loop_limit;
        ctx.deadline = self.env.deadline;
        ctx.validated_videos = Some(&self.validated);
        ctx
    }

    /// Live extraction writes into the folder; dry-run into a scratch dir.
    fn extraction_root(&mut self) -> Result<PathBuf, UnpackrError> {
        if !self.env.config.dry_run {
            return Ok(self.folder.clone());
        }
        if self.scratch.is_none() {
            let dir = tempfile::TempDir::new()
                .map_err(|e| UnpackrError::io(&self.folder, e))?;
            self.scratch = Some(dir);
        }
        Ok(self
            .scratch
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .unwrap_or_else(|| self.folder.clone()))
    }

    /// Map a scratch path back to its conceptual location in the folder so
    /// dry-run decisions name the same targets a live run would.
    fn op_path(&self, path: &Path) -> PathBuf {
        if let Some(scratch) = &self.scratch
            && let Ok(rel) = path.strip_prefix(scratch.path())
        {
            return self.folder.join(rel);
        }
        path.to_path_buf()
    }

    fn delete_file(
        &mut self,
        path: &Path,
        reason: ReasonCode,
        phase: PipelinePhase,
        archive_member: bool,
    ) -> bool {
        let op = FileOperation::delete_file(path, reason);
        let mut ctx = self.op_context(phase);
        ctx.archive_member = archive_member;
        match self.env.enforcer.execute(&op, &ctx) {
            Ok(outcome) if outcome.decided_to_act() => {
                self.removed.insert(resolve_absolute_path(path));
                true
            }
            Ok(_) => false,
            Err(e) => {
                if matches!(e, UnpackrError::SafetyRefusal { .. }) {
                    self.hard_failed = true;
                }
                self.soft_fail(&format!("delete failed for {}: {e}", display_name(path)));
                false
            }
        }
    }

    fn delete_archive_member(
        &mut self,
        member: &Path,
        reason: ReasonCode,
        proof: &DeletionProof,
    ) {
        let op = FileOperation::delete_file(member, reason);
        let mut ctx = self.op_context(PipelinePhase::CleanupPhase);
        ctx.archive_member = true;
        ctx.archive_proof = Some(proof);
        match self.env.enforcer.execute(&op, &ctx) {
            Ok(outcome) if outcome.decided_to_act() => {
                self.removed.insert(resolve_absolute_path(member));
            }
            Ok(_) => {}
            Err(e) => {
                if matches!(e, UnpackrError::SafetyRefusal { .. }) {
                    self.hard_failed = true;
                }
                self.soft_fail(&format!(
                    "archive member delete failed for {}: {e}",
                    display_name(member)
                ));
            }
        }
    }

    /// Junk files present in the folder right now, minus already-decided
    /// deletions, in lexicographic order.
    fn junk_files(&self) -> Vec<PathBuf> {
        let mut junk = Vec::new();
        let Ok(entries) = fs::read_dir(&self.folder) else {
            return junk;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = fs::symlink_metadata(&path) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            if self.removed.contains(&resolve_absolute_path(&path)) {
                continue;
            }
            let removable = dotted_extension(&path)
                .is_some_and(|ext| self.env.config.removable_extensions.contains(&ext));
            if removable {
                junk.push(path);
            }
        }
        junk.sort();
        junk
    }

    /// Delete-time re-check: no videos, no archives left, ignoring paths
    /// whose deletion has already been decided this run.
    fn folder_clear_of_videos_and_archives(&self) -> bool {
        self.tree_clear(&self.folder, VIDEO_SEARCH_DEPTH)
    }

    fn tree_clear(&self, dir: &Path, depth: usize) -> bool {
        let Ok(entries) = fs::read_dir(dir) else {
            // Unlistable at delete time: fail closed, keep the folder.
            return false;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = fs::symlink_metadata(&path) else {
                return false;
            };
            if meta.is_dir() {
                if depth == 0 || !self.tree_clear(&path, depth - 1) {
                    return false;
                }
                continue;
            }
            if self.removed.contains(&resolve_absolute_path(&path)) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if is_archive_file(name) {
                return false;
            }
            let is_video = dotted_extension(&path)
                .is_some_and(|ext| self.env.config.video_extensions.contains(&ext));
            if is_video {
                return false;
            }
        }
        true
    }

    fn emit_phase(&self, phase: PipelinePhase) {
        if let Some(logger) = self.env.logger {
            let outcome = if self.soft_failures.is_empty() {
                "ok".to_string()
            } else {
                format!("soft-failures={}", self.soft_failures.len())
            };
            logger.send(AuditEvent::PhaseCompleted {
                folder: folder_id(&self.folder),
                phase: phase.name(),
                outcome,
            });
        }
    }
}

enum PhaseStep<T> {
    Continue(T),
    Cancelled,
}

/// How the parity verdict shapes the rest of the folder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParityFlow {
    /// Verified or repaired (or no parity at all): extract normally.
    Proceed,
    /// Unrecoverable: archives are known-broken, skip extraction only.
    SkipExtraction,
    /// Parity tooling failed: go straight to cleanup, delete nothing.
    AbortToCleanup,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string())
}
