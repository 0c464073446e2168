//! Registry error types.

use std::path::PathBuf;

use tandem_core::CoreError;

/// Errors that can occur while packaging, proxying or rewriting lockfiles.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Module, configuration or process error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Tarball cache I/O error.
    #[error("cache error at {path}: {detail}")]
    CacheError { path: PathBuf, detail: String },

    /// A registry URL from the npm configuration is unusable.
    #[error("invalid registry URL '{url}': {detail}")]
    InvalidRegistry { url: String, detail: String },

    /// The request to an upstream registry could not be completed.
    #[error("upstream request to {url} failed: {detail}")]
    Upstream { url: String, detail: String },

    /// `npm pack` ran but the expected tarball is missing.
    #[error("packaging '{name}' failed: {detail}")]
    PackFailed { name: String, detail: String },

    /// The lockfile is unreadable or malformed.
    #[error("invalid lockfile {path}: {detail}")]
    InvalidLockfile { path: PathBuf, detail: String },

    /// The lockfile uses a format version tandem cannot rewrite.
    #[error("unsupported lockfileVersion {version} in {path}")]
    UnsupportedLockfile { path: PathBuf, version: u64 },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
