//! Dependency-ordered synchronization of tandem modules.
//!
//! A sync run walks the local dependency graph from one or more roots and
//! brings every module up to date before its dependants:
//!
//! - [`plan`] decides which modules take part and which must be packed
//! - [`synchronizer`] runs each step: install or quick-sync dependencies,
//!   rebuild, pack
//! - [`quick_sync`] copies a module into a dependant's `node_modules`
//! - [`npm`] runs npm against the registry proxy with lockfile maintenance
//! - [`fetch`] and [`publish`] cover cloning modules and releasing them

pub mod build;
pub mod context;
pub mod error;
pub mod fetch;
pub mod npm;
pub mod plan;
pub mod publish;
pub mod quick_sync;
pub mod synchronizer;

// Re-exports for convenience.
pub use build::build_if_changed;
pub use context::{Session, SyncContext};
pub use error::{Result, SyncError};
pub use fetch::{clone_missing, install_missing, needs_first_install};
pub use plan::{SyncPlan, SyncStep};
pub use publish::{publish, PublishOptions, PublishOutcome};
pub use quick_sync::{quick_sync, QuickSyncReport};
pub use synchronizer::{run_plan, sync_module, SyncResult, SyncResults};
