//! Persisted per-module file snapshots used for change detection.
//!
//! Each module owns one state file, `state-<sha256(module path)>.json`,
//! holding one [`ModuleState`] per subset tag. Comparison uses modification
//! times only: a file whose content changed while its mtime did not go
//! forward is not detected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::files;
use crate::integrity::ContentHash;
use crate::module::Module;
use crate::subset::Subset;

/// Snapshot of a module's tracked files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleState {
    pub module: String,
    /// When the snapshot was taken, in milliseconds since the epoch.
    pub timestamp: u64,
    /// Absolute file path to modification time in milliseconds.
    pub files: BTreeMap<String, u64>,
}

impl ModuleState {
    /// Digest over the file list and times, stable across runs.
    pub fn hash(&self) -> ContentHash {
        let mut data = String::new();
        for (path, mtime) in &self.files {
            data.push_str(path);
            data.push('\0');
            data.push_str(&mtime.to_string());
            data.push('\n');
        }
        ContentHash::compute(data.as_bytes())
    }
}

type StateFile = BTreeMap<String, ModuleState>;

/// Reads and writes module state files under one directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        StateStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the state file for `module`.
    pub fn state_file(&self, module: &Module) -> PathBuf {
        let key = ContentHash::compute(module.path().to_string_lossy().as_bytes());
        self.dir.join(format!("state-{key}.json"))
    }

    /// Snapshot the files of `module` that belong to `subset`.
    pub fn actual_state(&self, module: &Module, subset: Subset) -> ModuleState {
        let files = files::walk(module.path())
            .into_iter()
            .filter(|e| !e.is_dir && subset.includes(module, &e.relative, false))
            .map(|e| (e.path.to_string_lossy().into_owned(), e.modified_ms))
            .collect();
        ModuleState {
            module: module.name().full(),
            timestamp: now_millis(),
            files,
        }
    }

    /// The last snapshot saved for `subset`, or `None` on first run.
    pub fn saved_state(&self, module: &Module, subset: Subset) -> Result<Option<ModuleState>> {
        Ok(self.read(module)?.remove(subset.tag()))
    }

    /// Whether the files of `subset` changed since the last save.
    ///
    /// True when nothing was saved, when the number of tracked files
    /// differs, or when a saved file is gone or has a newer mtime.
    pub fn has_changed(&self, module: &Module, subset: Subset) -> Result<bool> {
        let Some(saved) = self.saved_state(module, subset)? else {
            return Ok(true);
        };
        let actual = self.actual_state(module, subset);
        let saved_files = filter_files(module, subset, &saved.files);
        let actual_files = filter_files(module, subset, &actual.files);

        if saved_files.len() != actual_files.len() {
            tracing::debug!(
                "{} {subset} file count changed: {} -> {}",
                module.name(),
                saved_files.len(),
                actual_files.len()
            );
            return Ok(true);
        }
        for (path, saved_mtime) in saved_files {
            match actual_files.get(path) {
                None => {
                    tracing::debug!("{} {subset}: {path} is gone", module.name());
                    return Ok(true);
                }
                Some(&&mtime) if mtime > *saved_mtime => {
                    tracing::debug!("{} {subset}: {path} modified", module.name());
                    return Ok(true);
                }
                Some(_) => {}
            }
        }
        Ok(false)
    }

    /// Persist `state` for `subset`, replacing any earlier snapshot.
    pub fn save(&self, module: &Module, subset: Subset, state: ModuleState) -> Result<()> {
        let mut file = self.read(module)?;
        file.insert(subset.tag().to_string(), state);

        let path = self.state_file(module);
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// Snapshot and persist in one step.
    pub fn save_actual(&self, module: &Module, subset: Subset) -> Result<ModuleState> {
        let state = self.actual_state(module, subset);
        self.save(module, subset, state.clone())?;
        Ok(state)
    }

    fn read(&self, module: &Module) -> Result<StateFile> {
        let path = self.state_file(module);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateFile::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| CoreError::InvalidState {
            path,
            detail: e.to_string(),
        })
    }
}

/// Entries of `files` that (still) belong to `subset`.
fn filter_files<'a>(
    module: &Module,
    subset: Subset,
    files: &'a BTreeMap<String, u64>,
) -> BTreeMap<&'a str, &'a u64> {
    files
        .iter()
        .filter(|(path, _)| {
            Path::new(path.as_str())
                .strip_prefix(module.path())
                .is_ok_and(|rel| subset.includes(module, rel, false))
        })
        .map(|(path, mtime)| (path.as_str(), mtime))
        .collect()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
