//! Synchronization error types.

use std::path::PathBuf;

use tandem_core::CoreError;
use tandem_registry::RegistryError;

/// Errors that can occur while synchronizing, fetching or publishing modules.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Module, configuration or process error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Packaging, proxy or lockfile error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// npm needs the registry proxy but none is running.
    #[error("the registry proxy is not running")]
    ProxyNotRunning,

    /// A module has no checkout and no repository to clone it from.
    #[error("module '{name}' is missing at {path} and has no repository to fetch it from")]
    NoRepository { name: String, path: PathBuf },

    /// The operation needs npm but the module opted out of it.
    #[error("module '{name}' is not managed by npm")]
    NotNpmManaged { name: String },

    /// `npm view` answered with something other than package info or E404.
    #[error("cannot query the registry for '{name}': {detail}")]
    RegistryQuery { name: String, detail: String },

    /// The current version is already published and no new one was given.
    #[error("version {version} of '{name}' is already published; pass a new version")]
    AlreadyPublished { name: String, version: String },

    /// A requested version is not valid semver.
    #[error("invalid version '{version}': {detail}")]
    InvalidVersion { version: String, detail: String },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
