//! Archive engine: listing validation and gated extraction.
//!
//! Two-step protocol per set. First the extractor's list mode is parsed and
//! every entry path is validated; one bad entry (absolute, `..`, symlink,
//! NUL, or escaping the extraction root) refuses the whole set, and the
//! archive files are left in place — the content may be recoverable
//! manually. Second, extraction itself is gated by a `WriteFile` operation
//! (containment + space budget) before the external tool runs.

#![allow(missing_docs)]

pub mod sets;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::core::errors::Result;
use crate::core::paths::is_safe_archive_entry;
use crate::safety::{
    DeletionProof, FileOperation, OpContext, OpOutcome, ReasonCode, SafetyEnforcer,
};
use crate::tools::{ArchiveEntry, ArchiveTool};

pub use sets::{ArchiveFamily, ArchiveSet, collect_sets};

/// Result of pushing one set through the list-validate-extract protocol.
#[derive(Debug)]
pub enum SetOutcome {
    /// Extraction succeeded; the proof authorizes member deletion (I3).
    Extracted(DeletionProof),
    /// The set is missing members and was never passed to the extractor.
    Incomplete,
    /// A listing entry failed validation; the set is refused, archives kept.
    ListingRefused { entry: String, why: &'static str },
    /// Tool failure (listing or extraction); archives kept.
    Failed { detail: String },
}

/// Validate every listing entry against the extraction root.
pub fn validate_entries(
    entries: &[ArchiveEntry],
    extraction_root: &Path,
) -> std::result::Result<(), (String, &'static str)> {
    for entry in entries {
        if entry.symlink {
            return Err((entry.path.clone(), "symbolic link"));
        }
        if !is_safe_archive_entry(&entry.path, extraction_root) {
            return Err((entry.path.clone(), "escapes extraction root"));
        }
    }
    Ok(())
}

/// List, validate, gate, and extract one archive set.
///
/// `folder` is the declared extraction root used for entry validation and
/// the `WriteFile` gate; `extract_to` is where the extractor actually
/// writes (the folder itself in live mode, a scratch directory in dry-run).
pub fn process_set<'a>(
    tool: &dyn ArchiveTool,
    set: &ArchiveSet,
    folder: &'a Path,
    extract_to: &Path,
    enforcer: &SafetyEnforcer,
    base_ctx: &OpContext<'a>,
) -> Result<SetOutcome> {
    if !set.complete {
        return Ok(SetOutcome::Incomplete);
    }

    // Step 1: listing and path validation.
    let entries = match tool.list(&set.first_part) {
        Ok(entries) => entries,
        Err(e) if matches!(e, crate::core::errors::UnpackrError::Cancelled) => return Err(e),
        Err(e) => {
            return Ok(SetOutcome::Failed {
                detail: format!("listing failed: {e}"),
            });
        }
    };
    if let Err((entry, why)) = validate_entries(&entries, folder) {
        return Ok(SetOutcome::ListingRefused { entry, why });
    }

    // Step 2: gate the write, then extract.
    let mut ctx = base_ctx.clone();
    ctx.write_root = Some(folder);
    ctx.declared_set_bytes = Some(set.total_bytes.max(1));
    let op = FileOperation::write_file(folder.to_path_buf(), ReasonCode::ExtractedOutput);
    match enforcer.execute(&op, &ctx)? {
        OpOutcome::Refused(invariant) => {
            return Ok(SetOutcome::Failed {
                detail: format!("extraction refused by {}", invariant.id()),
            });
        }
        OpOutcome::Executed { .. } | OpOutcome::DryRun => {}
    }

    let run = tool.extract(&set.first_part, extract_to, set.total_bytes)?;
    if run.timed_out {
        return Ok(SetOutcome::Failed {
            detail: "extraction timed out".to_string(),
        });
    }
    if !run.success {
        let snippet: String = run.text.chars().take(200).collect();
        return Ok(SetOutcome::Failed { detail: snippet });
    }

    Ok(SetOutcome::Extracted(DeletionProof::ExtractionVerified {
        first_part: set.first_part.clone(),
    }))
}

/// Archive sets in `dir` whose first parts have not been seen yet — the
/// nested archives that appeared after an extraction round.
#[must_use]
pub fn new_sets_in(dir: &Path, seen_first_parts: &HashSet<PathBuf>) -> Vec<ArchiveSet> {
    collect_sets(dir)
        .into_iter()
        .filter(|set| !seen_first_parts.contains(&set.first_part))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::stats::RunStats;
    use crate::pipeline::state::PipelinePhase;
    use crate::safety::EnforceMode;
    use crate::tools::fakes::FakeArchiveTool;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        source: PathBuf,
        folder: PathBuf,
        enforcer: SafetyEnforcer,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let source = tmp.path().join("source");
            let dest = tmp.path().join("dest");
            let folder = source.join("R1");
            fs::create_dir_all(&folder).unwrap();
            fs::create_dir_all(&dest).unwrap();
            let enforcer = SafetyEnforcer::new(
                &source,
                &dest,
                EnforceMode::Strict,
                false,
                None,
                Arc::new(RunStats::new()),
            );
            Self {
                _tmp: tmp,
                source,
                folder,
                enforcer,
            }
        }

        fn set_with(&self, names: &[&str]) -> ArchiveSet {
            for name in names {
                fs::write(self.folder.join(name), vec![0u8; 64]).unwrap();
            }
            let sets = collect_sets(&self.folder);
            assert_eq!(sets.len(), 1, "expected one set from {names:?}");
            sets.into_iter().next().unwrap()
        }
    }

    fn extract_ctx(folder: &Path) -> OpContext<'_> {
        let mut ctx = OpContext::for_phase(PipelinePhase::ExtractPhase);
        ctx.write_root = Some(folder);
        ctx
    }

    #[test]
    fn complete_set_extracts_and_yields_proof() {
        let fx = Fixture::new();
        let set = fx.set_with(&["movie.part01.rar", "movie.part02.rar"]);
        let tool = FakeArchiveTool::new().with_output("movie.part01.rar", &[("movie.mkv", 256)]);

        let ctx = extract_ctx(&fx.folder);
        let outcome =
            process_set(&tool, &set, &fx.folder, &fx.folder, &fx.enforcer, &ctx).unwrap();
        let SetOutcome::Extracted(DeletionProof::ExtractionVerified { first_part }) = outcome
        else {
            panic!("expected extraction, got {outcome:?}");
        };
        assert_eq!(first_part, set.first_part);
        assert!(fx.folder.join("movie.mkv").exists());
        assert_eq!(tool.extract_call_count(), 1);
    }

    #[test]
    fn incomplete_set_never_reaches_the_extractor() {
        let fx = Fixture::new();
        let set = fx.set_with(&["movie.part01.rar", "movie.part03.rar"]);
        let tool = FakeArchiveTool::new();

        let ctx = extract_ctx(&fx.folder);
        let outcome =
            process_set(&tool, &set, &fx.folder, &fx.folder, &fx.enforcer, &ctx).unwrap();
        assert!(matches!(outcome, SetOutcome::Incomplete));
        assert_eq!(tool.extract_call_count(), 0);
    }

    #[test]
    fn traversal_entry_refuses_the_whole_set() {
        let fx = Fixture::new();
        let set = fx.set_with(&["evil.rar"]);
        let tool = FakeArchiveTool::new().with_listing(
            "evil.rar",
            vec![
                ArchiveEntry {
                    path: "ok.mkv".to_string(),
                    symlink: false,
                },
                ArchiveEntry {
                    path: "../../etc/passwd".to_string(),
                    symlink: false,
                },
            ],
        );

        let ctx = extract_ctx(&fx.folder);
        let outcome =
            process_set(&tool, &set, &fx.folder, &fx.folder, &fx.enforcer, &ctx).unwrap();
        let SetOutcome::ListingRefused { entry, .. } = outcome else {
            panic!("expected listing refusal, got {outcome:?}");
        };
        assert_eq!(entry, "../../etc/passwd");
        assert_eq!(tool.extract_call_count(), 0);
        // Archives preserved.
        assert!(fx.folder.join("evil.rar").exists());
    }

    #[test]
    fn absolute_entry_refused() {
        let fx = Fixture::new();
        let set = fx.set_with(&["abs.rar"]);
        let tool = FakeArchiveTool::new().with_listing(
            "abs.rar",
            vec![ArchiveEntry {
                path: "/etc/cron.d/evil".to_string(),
                symlink: false,
            }],
        );

        let ctx = extract_ctx(&fx.folder);
        let outcome =
            process_set(&tool, &set, &fx.folder, &fx.folder, &fx.enforcer, &ctx).unwrap();
        assert!(matches!(outcome, SetOutcome::ListingRefused { .. }));
    }

    #[test]
    fn symlink_entry_refused() {
        let fx = Fixture::new();
        let set = fx.set_with(&["link.rar"]);
        let tool = FakeArchiveTool::new().with_listing(
            "link.rar",
            vec![ArchiveEntry {
                path: "innocent.mkv".to_string(),
                symlink: true,
            }],
        );

        let ctx = extract_ctx(&fx.folder);
        let outcome =
            process_set(&tool, &set, &fx.folder, &fx.folder, &fx.enforcer, &ctx).unwrap();
        let SetOutcome::ListingRefused { why, .. } = outcome else {
            panic!("expected refusal");
        };
        assert_eq!(why, "symbolic link");
    }

    #[test]
    fn listing_tool_failure_keeps_archives() {
        let fx = Fixture::new();
        let set = fx.set_with(&["broken.rar"]);
        let tool = FakeArchiveTool::new().failing_list("broken.rar");

        let ctx = extract_ctx(&fx.folder);
        let outcome =
            process_set(&tool, &set, &fx.folder, &fx.folder, &fx.enforcer, &ctx).unwrap();
        assert!(matches!(outcome, SetOutcome::Failed { .. }));
        assert!(fx.folder.join("broken.rar").exists());
    }

    #[test]
    fn extraction_failure_reported() {
        let fx = Fixture::new();
        let set = fx.set_with(&["bad.rar"]);
        let tool = FakeArchiveTool::new()
            .with_listing(
                "bad.rar",
                vec![ArchiveEntry {
                    path: "movie.mkv".to_string(),
                    symlink: false,
                }],
            )
            .failing_extract("bad.rar");

        let ctx = extract_ctx(&fx.folder);
        let outcome =
            process_set(&tool, &set, &fx.folder, &fx.folder, &fx.enforcer, &ctx).unwrap();
        let SetOutcome::Failed { detail } = outcome else {
            panic!("expected failure");
        };
        assert!(detail.contains("cannot open"));
    }

    #[test]
    fn dry_run_gates_but_extracts_to_scratch() {
        let fx = Fixture::new();
        let set = fx.set_with(&["movie.part01.rar", "movie.part02.rar"]);
        let tool = FakeArchiveTool::new().with_output("movie.part01.rar", &[("movie.mkv", 256)]);

        let dry_enforcer = SafetyEnforcer::new(
            &fx.source,
            fx._tmp.path().join("dest").as_path(),
            EnforceMode::Strict,
            true,
            None,
            Arc::new(RunStats::new()),
        );
        let scratch = TempDir::new().unwrap();
        let ctx = extract_ctx(&fx.folder);
        let outcome = process_set(
            &tool,
            &set,
            &fx.folder,
            scratch.path(),
            &dry_enforcer,
            &ctx,
        )
        .unwrap();
        assert!(matches!(outcome, SetOutcome::Extracted(_)));
        // The release folder itself is untouched.
        assert!(!fx.folder.join("movie.mkv").exists());
        assert!(scratch.path().join("movie.mkv").exists());
    }

    #[test]
    fn nested_set_discovery_skips_seen() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("outer.rar"), vec![0u8; 10]).unwrap();
        fs::write(tmp.path().join("inner.rar"), vec![0u8; 10]).unwrap();

        let mut seen = HashSet::new();
        seen.insert(tmp.path().join("outer.rar"));

        let fresh = new_sets_in(tmp.path(), &seen);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].first_part.file_name().unwrap(), "inner.rar");
    }
}
