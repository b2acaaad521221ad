//! A hostile archive listing must refuse the set before anything is
//! written: archives preserved, folder errored, destination untouched.

mod common;

use common::{Harness, MIB, fake_toolkit};
use unpackr::pipeline::FolderDisposition;
use unpackr::tools::ArchiveEntry;
use unpackr::tools::fakes::{FakeArchiveTool, FakeMediaTool};

fn entry(path: &str) -> ArchiveEntry {
    ArchiveEntry {
        path: path.to_string(),
        symlink: false,
    }
}

#[test]
fn traversal_listing_refuses_extraction_and_preserves_archives() {
    let hx = Harness::new();
    let folder = hx.folder("R5");
    let rar = hx.file(&folder, "movie.rar", 8 * MIB);
    let nfo = hx.file(&folder, "movie.nfo", 1024);

    let archive = FakeArchiveTool::new()
        .with_listing(
            "movie.rar",
            vec![entry("movie.mkv"), entry("../../etc/passwd")],
        )
        .with_output("movie.rar", &[("movie.mkv", 6 * MIB)]);
    let tools = fake_toolkit(archive, None, Some(FakeMediaTool::new()));

    let enforcer = hx.enforcer(false, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);

    assert_eq!(report.disposition, FolderDisposition::Errored);
    assert!(
        report
            .soft_failures
            .iter()
            .any(|f| f.contains("etc/passwd"))
    );

    // The extractor never ran; nothing was written anywhere.
    assert!(rar.exists());
    assert!(!folder.join("movie.mkv").exists());
    assert!(hx.dest_entries().is_empty());
    // Errored folders keep even their junk.
    assert!(nfo.exists());

    let stats = hx.stats.snapshot();
    assert_eq!(stats.archives_extracted, 0);
    assert_eq!(stats.archives_failed, 1);
    assert_eq!(stats.folders_cleaned, 0);
}

#[test]
fn absolute_path_listing_refused() {
    let hx = Harness::new();
    let folder = hx.folder("R5b");
    let rar = hx.file(&folder, "abs.rar", 10 * MIB);

    let archive =
        FakeArchiveTool::new().with_listing("abs.rar", vec![entry("/etc/cron.d/backdoor")]);
    let tools = fake_toolkit(archive, None, None);

    let enforcer = hx.enforcer(false, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);

    assert_eq!(report.disposition, FolderDisposition::Errored);
    assert!(rar.exists());
}

#[test]
fn symlink_inside_archive_refused() {
    let hx = Harness::new();
    let folder = hx.folder("R5c");
    let rar = hx.file(&folder, "link.rar", 10 * MIB);

    let archive = FakeArchiveTool::new().with_listing(
        "link.rar",
        vec![ArchiveEntry {
            path: "innocent.mkv".to_string(),
            symlink: true,
        }],
    );
    let tools = fake_toolkit(archive, None, None);

    let enforcer = hx.enforcer(false, None);
    let report = hx.run_folder(&folder, &tools, &enforcer);

    assert_eq!(report.disposition, FolderDisposition::Errored);
    assert!(rar.exists());
    assert!(
        report
            .soft_failures
            .iter()
            .any(|f| f.contains("symbolic link"))
    );
}
