//! End-to-end pipeline scenarios: clean release, unrecoverable parity,
//! truncated extraction output.

mod common;

use common::{Harness, MIB, fake_toolkit, healthy_media};
use unpackr::classify::FolderClass;
use unpackr::parity::ParityOutcome;
use unpackr::pipeline::FolderDisposition;
use unpackr::tools::fakes::{FakeArchiveTool, FakeMediaTool, FakeParityTool};

/// Clean release: parity verifies, extraction yields a healthy video, the
/// sample and junk are removed, the folder disappears.
#[test]
fn clean_release_end_to_end() {
    let hx = Harness::new();
    let folder = hx.folder("R1");
    hx.file(&folder, "movie.part01.rar", 4 * MIB);
    hx.file(&folder, "movie.part02.rar", 4 * MIB);
    hx.file(&folder, "movie.part03.rar", 4 * MIB);
    hx.file(&folder, "movie.par2", MIB / 2);
    hx.file(&folder, "sample.mkv", 2 * MIB);
    hx.file(&folder, "movie.nfo", 4096);

    let tools = fake_toolkit(
        FakeArchiveTool::new().with_output("movie.part01.rar", &[("movie.mkv", 6 * MIB)]),
        Some(FakeParityTool::new().with_output("movie.par2", "All files are correct")),
        Some(
            healthy_media("movie.mkv")
                .with_metadata("sample.mkv", 100.0, 100_000.0),
        ),
    );
    let enforcer = hx.enforcer(false, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);

    assert_eq!(report.class, FolderClass::ProcessRelease);
    assert_eq!(report.disposition, FolderDisposition::Deleted);
    assert_eq!(report.parity, Some(ParityOutcome::VerifiedClean));
    assert!(report.soft_failures.is_empty(), "{:?}", report.soft_failures);

    // The validated video landed in the destination, nothing else did.
    assert_eq!(hx.dest_entries(), vec!["movie.mkv".to_string()]);
    // The release folder is gone entirely.
    assert!(!folder.exists());

    let stats = hx.stats.snapshot();
    assert_eq!(stats.videos_moved, 1);
    assert_eq!(stats.videos_rejected, 1); // the sample
    assert_eq!(stats.archives_extracted, 1);
    assert_eq!(stats.parity_ok, 1);
    assert_eq!(stats.folders_cleaned, 1);
    assert_eq!(stats.junk_removed, 1);
    assert!(stats.refusals.is_empty());
}

/// A second pass over the same source must find nothing to do.
#[test]
fn second_run_is_a_noop() {
    let hx = Harness::new();
    let folder = hx.folder("R1");
    hx.file(&folder, "movie.rar", 10 * MIB);

    let tools = fake_toolkit(
        FakeArchiveTool::new().with_output("movie.rar", &[("movie.mkv", 6 * MIB)]),
        None,
        Some(healthy_media("movie.mkv")),
    );
    let enforcer = hx.enforcer(false, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);
    assert_eq!(report.disposition, FolderDisposition::Deleted);

    // Source root is empty now; a rescan yields no folders at all.
    let remaining: Vec<_> = std::fs::read_dir(&hx.source).unwrap().flatten().collect();
    assert!(remaining.is_empty());
}

/// Unrecoverable parity: no extraction is attempted, the known-broken
/// archives are deleted, nothing reaches the destination.
#[test]
fn unrecoverable_parity_deletes_archives_without_extraction() {
    let hx = Harness::new();
    let folder = hx.folder("R2");
    hx.file(&folder, "movie.part01.rar", 4 * MIB);
    hx.file(&folder, "movie.part02.rar", 4 * MIB);
    hx.file(&folder, "movie.par2", MIB / 2);
    hx.file(&folder, "sample.mkv", 2 * MIB);
    hx.file(&folder, "movie.nfo", 4096);

    let archive = FakeArchiveTool::new().with_output("movie.part01.rar", &[("movie.mkv", 6 * MIB)]);
    let tools = fake_toolkit(
        archive,
        Some(FakeParityTool::new().with_output(
            "movie.par2",
            "Repairing...\nRepair failed.\nYou need 82 more recovery blocks",
        )),
        Some(FakeMediaTool::new().with_metadata("sample.mkv", 100.0, 100_000.0)),
    );
    let enforcer = hx.enforcer(false, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);

    assert_eq!(report.parity, Some(ParityOutcome::Unrecoverable));
    assert_eq!(report.disposition, FolderDisposition::Deleted);
    // Nothing was extracted, nothing was moved.
    assert!(hx.dest_entries().is_empty());
    assert!(!folder.exists());

    let stats = hx.stats.snapshot();
    assert_eq!(stats.parity_failed, 1);
    assert_eq!(stats.archives_extracted, 0);
    assert_eq!(stats.videos_moved, 0);
}

/// Truncated video: extraction succeeds but the artifact is half its
/// declared size; it is deleted and the folder still counts as processed.
#[test]
fn truncated_video_is_deleted_and_folder_cleaned() {
    let hx = Harness::new();
    let folder = hx.folder("R4");
    hx.file(&folder, "movie.rar", 10 * MIB);
    hx.file(&folder, "movie.nfo", 1024);

    // Declared duration × bitrate imply ~4 MiB; actual extracted size 2 MiB
    // gives a ratio of 0.5, well under the truncation threshold.
    let tools = fake_toolkit(
        FakeArchiveTool::new().with_output("movie.rar", &[("movie.mkv", 2 * MIB)]),
        None,
        Some(FakeMediaTool::new().with_metadata("movie.mkv", 100.0, 335_544.0)),
    );
    let enforcer = hx.enforcer(false, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);

    assert_eq!(report.disposition, FolderDisposition::Deleted);
    assert!(hx.dest_entries().is_empty());
    assert!(!folder.exists());

    let stats = hx.stats.snapshot();
    assert_eq!(stats.videos_rejected, 1);
    assert_eq!(stats.videos_moved, 0);
    assert_eq!(stats.folders_cleaned, 1);
}

/// Nested archives extract in a second round, bounded by the loop limit.
#[test]
fn nested_archive_extracts_within_round_limit() {
    let hx = Harness::new();
    let folder = hx.folder("R5");
    hx.file(&folder, "outer.rar", 10 * MIB);

    let tools = fake_toolkit(
        FakeArchiveTool::new()
            .with_output("outer.rar", &[("inner.rar", 8 * MIB)])
            .with_output("inner.rar", &[("movie.mkv", 6 * MIB)]),
        None,
        Some(healthy_media("movie.mkv")),
    );
    let enforcer = hx.enforcer(false, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);

    assert_eq!(report.disposition, FolderDisposition::Deleted, "{:?}", report.soft_failures);
    assert_eq!(hx.dest_entries(), vec!["movie.mkv".to_string()]);
    assert_eq!(hx.stats.snapshot().archives_extracted, 2);
}

/// An archive set missing its middle part is preserved untouched.
#[test]
fn incomplete_set_is_preserved() {
    let hx = Harness::new();
    let folder = hx.folder("R6");
    let p1 = hx.file(&folder, "movie.part01.rar", 10 * MIB);
    let p3 = hx.file(&folder, "movie.part03.rar", 10 * MIB);

    let tools = fake_toolkit(FakeArchiveTool::new(), None, None);
    let enforcer = hx.enforcer(false, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);

    assert_eq!(report.disposition, FolderDisposition::Errored);
    assert!(
        report
            .soft_failures
            .iter()
            .any(|f| f.contains("missing parts"))
    );
    assert!(p1.exists());
    assert!(p3.exists());
    assert!(folder.exists());
}

/// Probe tool absent: verdicts are Unknown, the video stays in place and
/// the folder survives (fail-closed).
#[test]
fn missing_probe_tool_fails_closed() {
    let hx = Harness::new();
    let folder = hx.folder("R7");
    hx.file(&folder, "movie.rar", 10 * MIB);

    let tools = fake_toolkit(
        FakeArchiveTool::new().with_output("movie.rar", &[("movie.mkv", 6 * MIB)]),
        None,
        None, // no media tool at all
    );
    let enforcer = hx.enforcer(false, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);

    assert_eq!(report.disposition, FolderDisposition::Errored);
    // The unverifiable video is neither moved nor deleted.
    assert!(folder.join("movie.mkv").exists());
    assert!(hx.dest_entries().is_empty());
    assert_eq!(hx.stats.snapshot().videos_moved, 0);
}
