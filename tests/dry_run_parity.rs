//! Dry-run parity: the same input tree must yield the same sequence of file
//! operation decisions in dry-run and live mode; only execution differs.

mod common;

use std::fs;
use std::path::Path;

use common::{Harness, MIB, fake_toolkit, healthy_media};
use unpackr::logger::audit::{AuditLine, RecordOutcome};
use unpackr::pipeline::FolderDisposition;
use unpackr::tools::ToolKit;
use unpackr::tools::fakes::{FakeArchiveTool, FakeParityTool};

fn scenario_fixture(hx: &Harness) -> std::path::PathBuf {
    let folder = hx.folder("R1");
    hx.file(&folder, "movie.part01.rar", 4 * MIB);
    hx.file(&folder, "movie.part02.rar", 4 * MIB);
    hx.file(&folder, "movie.par2", MIB / 2);
    hx.file(&folder, "sample.mkv", 2 * MIB);
    hx.file(&folder, "movie.nfo", 4096);
    folder
}

fn scenario_tools() -> ToolKit {
    fake_toolkit(
        FakeArchiveTool::new().with_output("movie.part01.rar", &[("movie.mkv", 6 * MIB)]),
        Some(FakeParityTool::new().with_output("movie.par2", "All files are correct")),
        Some(healthy_media("movie.mkv").with_metadata("sample.mkv", 100.0, 100_000.0)),
    )
}

/// (op kind, reason, target name) triples of every operation record.
fn decisions(log: &Path) -> Vec<(String, String, String)> {
    fs::read_to_string(log)
        .unwrap()
        .lines()
        .filter_map(|l| serde_json::from_str::<AuditLine>(l).ok())
        .filter(|r| r.event == "operation")
        .map(|r| {
            (
                r.op.unwrap_or_default(),
                r.reason.unwrap_or_default(),
                r.target.unwrap_or_default(),
            )
        })
        .collect()
}

fn outcomes(log: &Path) -> Vec<RecordOutcome> {
    fs::read_to_string(log)
        .unwrap()
        .lines()
        .filter_map(|l| serde_json::from_str::<AuditLine>(l).ok())
        .filter(|r| r.event == "operation")
        .filter_map(|r| r.outcome)
        .collect()
}

#[test]
fn dry_run_and_live_decide_identically() {
    // Dry run.
    let dry = Harness::new();
    let dry_folder = scenario_fixture(&dry);
    let dry_log = dry.tmp.path().join("dry.jsonl");
    let dry_logger = dry.logger_to(&dry_log);
    let dry_enforcer = dry.enforcer(true, Some(dry_logger.clone()));
    let dry_report = dry.run_folder(&dry_folder, &scenario_tools(), &dry_enforcer);
    dry_logger.shutdown();

    // Live run over an identical fixture.
    let live = Harness::new();
    let live_folder = scenario_fixture(&live);
    let live_log = live.tmp.path().join("live.jsonl");
    let live_logger = live.logger_to(&live_log);
    let live_enforcer = live.enforcer(false, Some(live_logger.clone()));
    let live_report = live.run_folder(&live_folder, &scenario_tools(), &live_enforcer);
    live_logger.shutdown();

    // Identical decision sequences: target, kind, reason.
    let dry_decisions = decisions(&dry_log);
    let live_decisions = decisions(&live_log);
    assert_eq!(dry_decisions, live_decisions);
    assert!(!dry_decisions.is_empty());

    // Only execution differs.
    assert!(
        outcomes(&dry_log)
            .iter()
            .all(|o| *o == RecordOutcome::DryRun)
    );
    assert!(
        outcomes(&live_log)
            .iter()
            .all(|o| *o == RecordOutcome::Executed)
    );

    // The dry run mutated nothing.
    assert_eq!(dry_report.disposition, FolderDisposition::Deleted);
    assert!(dry_folder.exists());
    assert!(dry_folder.join("movie.part01.rar").exists());
    assert!(dry_folder.join("sample.mkv").exists());
    assert!(dry_folder.join("movie.nfo").exists());
    assert!(dry.dest_entries().is_empty());

    // The live run did.
    assert_eq!(live_report.disposition, FolderDisposition::Deleted);
    assert!(!live_folder.exists());
    assert_eq!(live.dest_entries(), vec!["movie.mkv".to_string()]);

    // Identical decision statistics.
    let dry_stats = dry.stats.snapshot();
    let live_stats = live.stats.snapshot();
    assert_eq!(dry_stats, live_stats);
}

#[test]
fn dry_run_still_refuses_bad_operations() {
    // Predicates run in dry-run: a traversal listing is refused the same way.
    let hx = Harness::new();
    let folder = hx.folder("R1");
    hx.file(&folder, "evil.rar", 10 * MIB);

    let tools = fake_toolkit(
        FakeArchiveTool::new().with_listing(
            "evil.rar",
            vec![unpackr::tools::ArchiveEntry {
                path: "../../escape.mkv".to_string(),
                symlink: false,
            }],
        ),
        None,
        None,
    );
    let enforcer = hx.enforcer(true, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);

    assert_eq!(report.disposition, FolderDisposition::Errored);
    assert!(folder.join("evil.rar").exists());
}
