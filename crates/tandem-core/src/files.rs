//! Walking a module's files.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::{DirEntry, WalkDir};

/// Directories that never belong to a module's sources.
pub const INCIDENTAL_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    BACKUP_DIR,
];

/// Where tandem keeps files it temporarily moves aside inside a module.
pub const BACKUP_DIR: &str = ".tandem-backup";

/// One file or directory found under a module root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Path relative to the walk root.
    pub relative: PathBuf,
    pub is_dir: bool,
    pub modified_ms: u64,
}

/// Whether a single path component names an incidental directory.
pub fn is_incidental(name: &str) -> bool {
    INCIDENTAL_DIRS.contains(&name)
}

/// Whether any component of a relative path is incidental.
pub fn has_incidental_component(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| c.as_os_str().to_str().is_some_and(is_incidental))
}

/// Walk everything under `root`, depth-first with entries sorted by name.
///
/// Directories are reported before their contents and the root itself is
/// not reported. Incidental directories are neither reported nor entered.
/// Entries that disappear or cannot be stat'ed while walking are skipped.
pub fn walk(root: &Path) -> Vec<FileEntry> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !entry_is_incidental(e));

    let mut entries = Vec::new();
    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("skipping unreadable entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        // follow symlinks the way a copy would
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!("skipping {}: {e}", path.display());
                continue;
            }
        };
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        entries.push(FileEntry {
            path: path.to_path_buf(),
            relative: relative.to_path_buf(),
            is_dir: meta.is_dir(),
            modified_ms: modified_millis(&meta),
        });
    }
    entries
}

fn entry_is_incidental(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_str().is_some_and(is_incidental)
}

/// Modification time in milliseconds since the epoch; 0 if unavailable.
pub fn modified_millis(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Whether a directory has entries other than hidden ones.
pub fn has_visible_entries(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .any(|e| !e.file_name().to_string_lossy().starts_with('.')),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn walk_order_and_filtering() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.js"));
        touch(&root.join("a/z.js"));
        touch(&root.join("a/y.js"));
        touch(&root.join("node_modules/dep/index.js"));
        touch(&root.join(".git/HEAD"));
        touch(&root.join("src/.git-keep"));

        let relative: Vec<String> = walk(root)
            .iter()
            .map(|e| e.relative.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            relative,
            vec!["a", "a/y.js", "a/z.js", "b.js", "src", "src/.git-keep"]
        );
    }

    #[test]
    fn walk_reports_kinds_and_times() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("sub/file.txt"));
        let mtime = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(dir.path().join("sub/file.txt"), mtime).unwrap();

        let entries = walk(dir.path());
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert!(!entries[1].is_dir);
        assert_eq!(entries[1].modified_ms, 1_600_000_000_000);
    }

    #[test]
    fn walk_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(walk(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn incidental_components() {
        assert!(has_incidental_component(Path::new("a/node_modules/b")));
        assert!(has_incidental_component(Path::new(".tandem-backup/.npmignore")));
        assert!(!has_incidental_component(Path::new("src/git/index.js")));
    }

    #[test]
    fn visible_entries() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_visible_entries(dir.path()));
        touch(&dir.path().join(".package-lock.json"));
        assert!(!has_visible_entries(dir.path()));
        touch(&dir.path().join("left-pad/index.js"));
        assert!(has_visible_entries(dir.path()));
    }
}
