//! Packing local modules into tarballs.
//!
//! The publish subset of a module is copied into a working directory named
//! after the module and a hash of that subset's state, then `npm pack` runs
//! there. As long as no published file changes, the same directory and
//! tarball are reused.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tandem_core::{
    copy_file, default_transforms, files, Integrity, Module, PackageManifest, Process,
    StateStore, Subset, Transform,
};

use tokio::sync::Mutex;

use crate::error::{RegistryError, Result};

/// A packed tarball.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackResult {
    pub tarball: PathBuf,
    pub version: String,
    pub integrity: Integrity,
}

/// Builds and caches module tarballs under a temp root.
///
/// Clones share one lock per working directory, so concurrent packs of the
/// same module state run one after the other and reuse the first tarball.
#[derive(Debug, Clone)]
pub struct Packager {
    temp_root: PathBuf,
    state: StateStore,
    transforms: Vec<Transform>,
    pack_command: Vec<String>,
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl Packager {
    pub fn new(temp_root: impl Into<PathBuf>, state: StateStore) -> Self {
        Packager {
            temp_root: temp_root.into(),
            state,
            transforms: default_transforms(),
            pack_command: vec![
                tandem_core::process::npm_program().to_string(),
                "pack".to_string(),
            ],
            locks: Arc::default(),
        }
    }

    /// Replace the command that produces the tarball inside the working
    /// directory (`npm pack` by default).
    pub fn with_pack_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pack_command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Working directory for the current publish-subset state of `module`.
    pub fn work_dir(&self, module: &Module) -> PathBuf {
        let hash = self.state.actual_state(module, Subset::Publish).hash();
        let name = module.name();
        let stem = match name.scope() {
            Some(scope) => format!("{scope}-{}", name.pkg()),
            None => name.pkg().to_string(),
        };
        self.temp_root.join(format!("{stem}-{}", hash.short(16)))
    }

    /// Pack `module`, reusing an earlier tarball when its files are unchanged.
    pub async fn pack(&self, module: &Module) -> Result<PackResult> {
        let manifest = PackageManifest::load(module.path())?;
        let version = manifest.require_version(module.path())?.to_string();
        let dir = self.work_dir(module);
        let tarball = dir.join(module.name().tarball_file_name(&version));

        let lock = self.lock_for(&dir).await;
        let _guard = lock.lock().await;
        if tarball.is_file() {
            tracing::debug!("reusing tarball {}", tarball.display());
        } else {
            self.prepare(module, &dir)?;
            tracing::info!("packing {}@{version}", module.name());
            let (program, args) = self
                .pack_command
                .split_first()
                .ok_or_else(|| RegistryError::PackFailed {
                    name: module.name().full(),
                    detail: "no pack command configured".to_string(),
                })?;
            Process::new(program.clone())
                .args(args.iter().cloned())
                .current_dir(&dir)
                .output()
                .await?;
            if !tarball.is_file() {
                return Err(RegistryError::PackFailed {
                    name: module.name().full(),
                    detail: format!("expected tarball {} was not produced", tarball.display()),
                });
            }
        }

        let data = std::fs::read(&tarball)?;
        Ok(PackResult {
            tarball,
            version,
            integrity: Integrity::compute(&data),
        })
    }

    async fn lock_for(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(dir.to_path_buf()).or_default().clone()
    }

    /// Recreate `dir` holding the publish subset of `module`.
    fn prepare(&self, module: &Module, dir: &Path) -> Result<()> {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;
        for entry in files::walk(module.path()) {
            if !Subset::Publish.includes(module, &entry.relative, entry.is_dir) {
                continue;
            }
            let target = dir.join(&entry.relative);
            if entry.is_dir {
                std::fs::create_dir_all(&target)?;
            } else {
                copy_file(&entry.path, &target, &self.transforms)?;
            }
        }
        Ok(())
    }

    /// Remove every working directory.
    pub fn clean(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.temp_root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
