//! Shared path manipulation and containment utilities.
//!
//! Every destructive decision in the pipeline reduces to one of the
//! predicates here: is this path inside that root, is this file name safe to
//! create, does this archive entry stay inside its extraction root. All of
//! them operate on normalized absolute paths so that `..` games and symlink
//! aliases cannot slip an operation past an invariant.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Reserved device names that must never appear as a file name component
/// on Windows targets. Checked case-insensitively, ignoring any extension.
const RESERVED_DEVICE_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve
/// symlinks and normalize components. If it fails (e.g. path does not exist
/// yet, as with a move destination), the nearest existing ancestor is
/// canonicalized and the remaining components are appended after syntactic
/// `..`/`.` resolution, so containment checks agree with checks on paths
/// that do exist.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    let normalized = normalize_syntactic(&absolute);
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    let mut cursor = normalized.clone();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(&cursor) {
            let mut out = canonical;
            for part in tail.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (
            cursor.file_name().map(std::ffi::OsStr::to_os_string),
            cursor.parent().map(Path::to_path_buf),
        ) {
            (Some(name), Some(parent)) => {
                tail.push(name);
                cursor = parent;
            }
            _ => return normalized,
        }
    }
}

/// Syntactic normalization: drops `.`, resolves `..` against preceding
/// normal components, never touches the filesystem.
pub fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// Whether `path`, after full normalization, lies within `root`.
///
/// `root` is normalized the same way. A path equal to the root counts as
/// within it.
#[must_use]
pub fn is_within(path: &Path, root: &Path) -> bool {
    let path = resolve_absolute_path(path);
    let root = resolve_absolute_path(root);
    path.starts_with(&root)
}

/// Whether `name` is acceptable as the final component of a created or
/// moved file: no NUL bytes, no path separators, no reserved device names.
#[must_use]
pub fn is_safe_file_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if memchr::memchr(0, name.as_bytes()).is_some() {
        return false;
    }
    if name.contains('/') || name.contains('\\') {
        return false;
    }
    let stem = name.split('.').next().unwrap_or(name);
    let lowered = stem.to_ascii_lowercase();
    !RESERVED_DEVICE_NAMES.contains(&lowered.as_str())
}

/// Validate one archive listing entry against its extraction root.
///
/// Rejects absolute entries, entries with any `..` segment, entries with
/// embedded NUL bytes, and entries that normalize outside `root`. The
/// extractor is never pointed at a set containing even one bad entry.
#[must_use]
pub fn is_safe_archive_entry(entry: &str, root: &Path) -> bool {
    if entry.is_empty() {
        return false;
    }
    if memchr::memchr(0, entry.as_bytes()).is_some() {
        return false;
    }
    let entry_path = Path::new(entry);
    if entry_path.is_absolute() || entry.starts_with('\\') {
        return false;
    }
    // Windows drive prefix smuggled into a relative-looking entry.
    if entry.len() >= 2 && entry.as_bytes()[1] == b':' {
        return false;
    }
    if entry_path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return false;
    }
    let joined = normalize_syntactic(&root.join(entry_path));
    joined.starts_with(normalize_syntactic(root))
}

/// Lowercased extension of a path including the leading dot, or `None`.
#[must_use]
pub fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_existing_path_canonically() {
        let cwd = env::current_dir().unwrap();
        let resolved = resolve_absolute_path(Path::new("."));
        assert_eq!(resolved, std::fs::canonicalize(&cwd).unwrap());
    }

    #[test]
    fn normalizes_nonexistent_path_syntactically() {
        let input = Path::new("/nonexistent/foo/../bar");
        assert!(std::fs::canonicalize(input).is_err());
        assert_eq!(resolve_absolute_path(input), PathBuf::from("/nonexistent/bar"));
    }

    #[test]
    fn is_within_accepts_children_and_self() {
        let root = Path::new("/srv/dest");
        assert!(is_within(Path::new("/srv/dest/movie.mkv"), root));
        assert!(is_within(Path::new("/srv/dest/sub/movie.mkv"), root));
        assert!(is_within(root, root));
    }

    #[test]
    fn is_within_rejects_siblings_and_traversal() {
        let root = Path::new("/srv/dest");
        assert!(!is_within(Path::new("/srv/destroyer/movie.mkv"), root));
        assert!(!is_within(Path::new("/srv/dest/../other/movie.mkv"), root));
        assert!(!is_within(Path::new("/etc/passwd"), root));
    }

    #[test]
    fn safe_file_names() {
        assert!(is_safe_file_name("movie.mkv"));
        assert!(is_safe_file_name("Some.Release.2024-GROUP.mkv"));
        assert!(!is_safe_file_name(""));
        assert!(!is_safe_file_name("."));
        assert!(!is_safe_file_name(".."));
        assert!(!is_safe_file_name("a/b.mkv"));
        assert!(!is_safe_file_name("a\\b.mkv"));
        assert!(!is_safe_file_name("nul"));
        assert!(!is_safe_file_name("CON.mkv"));
        assert!(!is_safe_file_name("LPT1.txt"));
        assert!(!is_safe_file_name("bad\0name"));
    }

    #[test]
    fn safe_archive_entries() {
        let root = Path::new("/srv/source/R1");
        assert!(is_safe_archive_entry("movie.mkv", root));
        assert!(is_safe_archive_entry("sub/movie.mkv", root));
        assert!(!is_safe_archive_entry("", root));
        assert!(!is_safe_archive_entry("/etc/passwd", root));
        assert!(!is_safe_archive_entry("../../etc/passwd", root));
        assert!(!is_safe_archive_entry("sub/../../../etc/passwd", root));
        assert!(!is_safe_archive_entry("ok/../fine/../..", root));
        assert!(!is_safe_archive_entry("C:evil.exe", root));
        assert!(!is_safe_archive_entry("\\\\server\\share", root));
        assert!(!is_safe_archive_entry("nul\0byte", root));
    }

    #[test]
    fn interior_dotdot_that_stays_inside_is_still_rejected() {
        // Even an entry that would normalize back inside the root is refused
        // when it carries a `..` segment; the rule is syntactic.
        let root = Path::new("/srv/source/R1");
        assert!(!is_safe_archive_entry("sub/../movie.mkv", root));
    }

    #[test]
    fn dotted_extension_lowercases() {
        assert_eq!(
            dotted_extension(Path::new("A.MKV")),
            Some(".mkv".to_string())
        );
        assert_eq!(
            dotted_extension(Path::new("x.part01.rar")),
            Some(".rar".to_string())
        );
        assert_eq!(dotted_extension(Path::new("noext")), None);
    }
}
