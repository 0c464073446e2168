//! Tarball cache for proxied upstream packages.
//!
//! Layout:
//! ```text
//! <cache_root>/
//!   <sha256(upstream url)>.tgz
//! ```
//!
//! Entries are never updated once written; the cache only grows until it is
//! cleared with `tandem clean cache`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tandem_core::ContentHash;

use crate::error::{RegistryError, Result};

static PARTIAL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A filesystem tarball cache keyed by upstream URL.
#[derive(Debug, Clone)]
pub struct TarballCache {
    root: PathBuf,
}

impl TarballCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        TarballCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the tarball for `url` lives (whether cached or not).
    pub fn path_for(&self, url: &str) -> PathBuf {
        let key = ContentHash::compute(url.as_bytes());
        self.root.join(format!("{key}.tgz"))
    }

    /// The cached tarball for `url`, if present.
    pub fn get(&self, url: &str) -> Option<PathBuf> {
        let path = self.path_for(url);
        path.is_file().then_some(path)
    }

    /// Store tarball bytes for `url`.
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// concurrent readers never see a partial tarball. Two writers racing on
    /// the same key both succeed with identical content.
    pub fn store(&self, url: &str, data: &[u8]) -> Result<PathBuf> {
        let cache_error = |path: &Path, e: std::io::Error| RegistryError::CacheError {
            path: path.to_path_buf(),
            detail: e.to_string(),
        };

        std::fs::create_dir_all(&self.root).map_err(|e| cache_error(&self.root, e))?;
        let path = self.path_for(url);
        let partial = path.with_extension(format!(
            "part-{}-{}",
            std::process::id(),
            PARTIAL_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&partial, data).map_err(|e| cache_error(&partial, e))?;
        std::fs::rename(&partial, &path).map_err(|e| cache_error(&path, e))?;
        tracing::debug!("cached {url} as {}", path.display());
        Ok(path)
    }

    /// Remove every cached tarball.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::CacheError {
                path: self.root.clone(),
                detail: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TarballCache::new(dir.path().join("cache"));
        let url = "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz";

        assert!(cache.get(url).is_none());
        let stored = cache.store(url, b"tarball").unwrap();
        assert_eq!(cache.get(url), Some(stored.clone()));
        assert_eq!(std::fs::read(&stored).unwrap(), b"tarball");

        // no leftovers from the temporary write
        assert_eq!(std::fs::read_dir(cache.root()).unwrap().count(), 1);
    }

    #[test]
    fn keys_differ_per_url() {
        let cache = TarballCache::new("/c");
        assert_ne!(cache.path_for("https://a/x.tgz"), cache.path_for("https://a/y.tgz"));
        assert_eq!(cache.path_for("https://a/x.tgz"), cache.path_for("https://a/x.tgz"));
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TarballCache::new(dir.path().join("cache"));
        cache.store("u", b"x").unwrap();
        cache.clear().unwrap();
        assert!(!cache.root().exists());
        // clearing twice is fine
        cache.clear().unwrap();
    }
}
