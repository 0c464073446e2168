//! Core error types.

use std::path::PathBuf;

/// Errors that can occur while loading a workspace or inspecting modules.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid or incomplete workspace configuration.
    #[error("invalid configuration {path}: {detail}")]
    Config { path: PathBuf, detail: String },

    /// A module's `package.json` is missing or malformed.
    #[error("invalid package manifest {path}: {detail}")]
    InvalidManifest { path: PathBuf, detail: String },

    /// A package name could not be parsed.
    #[error("invalid package name '{name}'")]
    InvalidName { name: String },

    /// A dependency of a module is already one of its ancestors.
    #[error("dependency cycle: '{dependency}' is required by {}", path.join(" -> "))]
    DependencyCycle {
        dependency: String,
        path: Vec<String>,
    },

    /// A module lookup by name or path failed.
    #[error("no local module {what}")]
    UnknownModule { what: String },

    /// A child process could not be started or exited unsuccessfully.
    #[error("`{command}` failed{}: {output}", code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    ProcessFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// Persisted module state is unreadable.
    #[error("invalid state file {path}: {detail}")]
    InvalidState { path: PathBuf, detail: String },

    /// A glob or ignore pattern failed to compile.
    #[error("invalid pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
