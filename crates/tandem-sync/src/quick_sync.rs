//! Copying a module straight into a dependant's `node_modules`.
//!
//! Quick-sync mirrors the publish subset of a source module into the
//! directory where a dependant has it installed, without going through
//! npm. Files are copied when the installed copy is missing or older than
//! the source, and installed files the source no longer publishes are
//! pruned.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tandem_core::{copy_file, files, Module, Subset, Transform};

use crate::error::Result;

/// What a quick-sync run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuickSyncReport {
    pub copied: usize,
    pub removed: usize,
    /// The install location is a symlink and was left alone.
    pub skipped: bool,
}

impl QuickSyncReport {
    pub fn is_noop(&self) -> bool {
        self.copied == 0 && self.removed == 0
    }
}

/// Sync `source` into the copy installed under `target`'s `node_modules`.
pub fn quick_sync(source: &Module, target: &Module, transforms: &[Transform]) -> Result<QuickSyncReport> {
    let install_dir = target.install_path_of(source.name());
    let report = sync_into(source, &install_dir, transforms)?;
    if !report.is_noop() {
        tracing::info!(
            "{} -> {}: copied {}, removed {}",
            source.name(),
            target.name(),
            report.copied,
            report.removed
        );
    }
    Ok(report)
}

/// Sync `source` into an arbitrary install directory.
pub fn sync_into(source: &Module, install_dir: &Path, transforms: &[Transform]) -> Result<QuickSyncReport> {
    if install_dir.is_symlink() {
        tracing::warn!(
            "skipping sync into {} because it is a linked dependency",
            install_dir.display()
        );
        return Ok(QuickSyncReport {
            skipped: true,
            ..QuickSyncReport::default()
        });
    }

    let copied = copy_phase(source, install_dir, transforms)?;
    let removed = prune_phase(source, install_dir);
    Ok(QuickSyncReport {
        copied,
        removed,
        skipped: false,
    })
}

fn copy_phase(source: &Module, install_dir: &Path, transforms: &[Transform]) -> Result<usize> {
    let mut copied = 0;
    for entry in files::walk(source.path()) {
        if !Subset::Publish.includes(source, &entry.relative, entry.is_dir) {
            continue;
        }
        let target = install_dir.join(&entry.relative);
        let changed = if entry.is_dir {
            sync_directory(&target)?
        } else {
            sync_file(&entry.path, entry.modified_ms, &target, transforms)?
        };
        if changed {
            copied += 1;
        }
    }
    Ok(copied)
}

fn sync_directory(target: &Path) -> Result<bool> {
    match std::fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => return Ok(false),
        Ok(_) => std::fs::remove_file(target)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::create_dir_all(target)?;
    Ok(true)
}

fn sync_file(source: &Path, source_ms: u64, target: &Path, transforms: &[Transform]) -> Result<bool> {
    match std::fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(target)?,
        Ok(meta) if meta.file_type().is_symlink() => std::fs::remove_file(target)?,
        Ok(meta) => {
            if source_ms <= files::modified_millis(&meta) {
                return Ok(false);
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!("cannot copy to {}: {e}", target.display());
            return Ok(false);
        }
    }
    Ok(copy_file(source, target, transforms)?)
}

/// Remove installed entries the source no longer publishes. The full set is
/// collected before anything is deleted.
fn prune_phase(source: &Module, install_dir: &Path) -> usize {
    let mut doomed: Vec<(PathBuf, bool)> = Vec::new();
    for entry in files::walk(install_dir) {
        if doomed.iter().any(|(dir, is_dir)| *is_dir && entry.path.starts_with(dir)) {
            continue;
        }
        let source_path = source.path().join(&entry.relative);
        let keep = source_path.exists()
            && Subset::Publish.includes(source, &entry.relative, entry.is_dir);
        if !keep {
            doomed.push((entry.path, entry.is_dir));
        }
    }

    let mut removed = 0;
    for (path, is_dir) in doomed {
        let result = if is_dir {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("failed to remove {}: {e}", path.display()),
        }
    }
    removed
}
