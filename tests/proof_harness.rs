//! Property checks over the safety predicates that every destructive
//! operation ultimately rests on.

use std::path::Path;

use proptest::prelude::*;

use unpackr::core::paths::{is_safe_archive_entry, is_safe_file_name, is_within};

proptest! {
    /// No entry containing a `..` segment ever passes validation, wherever
    /// the segment sits.
    #[test]
    fn dotdot_segment_never_validates(
        prefix in "[a-z]{0,8}",
        suffix in "[a-z]{0,8}",
    ) {
        let root = Path::new("/srv/source/R1");
        let with_sep = format!("{prefix}/../{suffix}");
        prop_assert!(!is_safe_archive_entry(&with_sep, root));
        prop_assert!(!is_safe_archive_entry("..", root));
    }

    /// Absolute entries never validate.
    #[test]
    fn absolute_entry_never_validates(tail in "[a-z/]{0,16}") {
        let root = Path::new("/srv/source/R1");
        let entry = format!("/{tail}");
        prop_assert!(!is_safe_archive_entry(&entry, root));
    }

    /// Plain relative names made of safe characters always validate.
    #[test]
    fn benign_relative_entries_validate(
        dir in "[a-z][a-z0-9]{0,10}",
        name in "[a-z][a-z0-9]{0,10}",
        ext in "(mkv|mp4|avi)",
    ) {
        let root = Path::new("/srv/source/R1");
        let entry = format!("{dir}/{name}.{ext}");
        prop_assert!(is_safe_archive_entry(&entry, root));
    }

    /// Names containing separators or NUL bytes are never safe file names.
    #[test]
    fn separator_names_never_safe(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
        let with_slash = format!("{}/{}", a, b);
        let with_backslash = format!("{}\\{}", a, b);
        let with_nul = format!("{}\0{}", a, b);
        prop_assert!(!is_safe_file_name(&with_slash));
        prop_assert!(!is_safe_file_name(&with_backslash));
        prop_assert!(!is_safe_file_name(&with_nul));
    }

    /// Anything inside a root is within it; its siblings are not.
    #[test]
    fn containment_respects_component_boundaries(name in "[a-z]{1,10}") {
        let root = Path::new("/srv/dest");
        let inside = root.join(&name);
        prop_assert!(is_within(&inside, root));

        let sibling = format!("/srv/dest-{name}/file");
        prop_assert!(!is_within(Path::new(&sibling), root));
    }
}

#[test]
fn reserved_device_names_rejected_with_any_case_and_extension() {
    for name in ["CON", "con", "Nul", "com1", "LPT9"] {
        assert!(!is_safe_file_name(name), "{name}");
        assert!(!is_safe_file_name(&format!("{name}.mkv")), "{name}.mkv");
    }
    // Near-misses stay allowed.
    assert!(is_safe_file_name("console.mkv"));
    assert!(is_safe_file_name("com10.mkv"));
}
