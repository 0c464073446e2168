//! Core model for tandem workspaces.
//!
//! A tandem workspace is a set of npm packages developed side by side. This
//! crate knows what those packages are and how they relate:
//!
//! - **Modules**: locally managed packages loaded from `tandem.toml`
//! - **Subsets**: which files matter for building and for publishing
//! - **State**: mtime snapshots that answer "did this change since last time"
//! - **Graph**: the dependency order between local modules, with cycle checks
//!
//! It also holds the small utilities the other crates share: the file copy
//! with its content transforms, child process handling and hashing.

pub mod config;
pub mod error;
pub mod files;
pub mod graph;
pub mod integrity;
pub mod manifest;
pub mod module;
pub mod npmrc;
pub mod process;
pub mod state;
pub mod subset;
pub mod transform;
pub mod tree;
pub mod workspace;

// Re-exports for convenience.
pub use config::WorkspaceConfig;
pub use error::{CoreError, Result};
pub use graph::{direct_deps, walk, walk_order, WalkAction};
pub use integrity::{ContentHash, Integrity};
pub use manifest::PackageManifest;
pub use module::{Module, ModuleName, ModuleSpec};
pub use npmrc::NpmConfig;
pub use process::Process;
pub use state::{ModuleState, StateStore};
pub use subset::Subset;
pub use transform::{copy_file, default_transforms, Transform};
pub use workspace::{Dirs, Workspace};
