//! Running a sync plan.
//!
//! Each step brings the local dependencies of one module up to date, then
//! optionally rebuilds and packs it:
//!
//! - a module with a lockfile is installed through npm. Dependencies whose
//!   recorded integrity no longer matches the tarball packed earlier in
//!   the run are removed first so npm fetches them again.
//! - a module without a lockfile gets its local dependencies quick-synced.

use std::collections::HashMap;

use tandem_core::{direct_deps, Integrity, Module};
use tandem_registry::Lockfile;

use crate::build::build_if_changed;
use crate::context::SyncContext;
use crate::error::Result;
use crate::fetch::needs_first_install;
use crate::npm;
use crate::plan::SyncPlan;
use crate::quick_sync::quick_sync;

/// Outcome of one sync step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// Integrity of the tarball packed for the module, if it was packed.
    pub actual_integrity: Option<Integrity>,
}

/// Results of the steps run so far, by module name.
pub type SyncResults = HashMap<String, SyncResult>;

/// Run every step of `plan` in order.
pub async fn run_plan(ctx: &SyncContext, plan: &SyncPlan<'_>, build: bool) -> Result<SyncResults> {
    let mut results = SyncResults::new();
    for step in plan.steps() {
        tracing::debug!("syncing {}", step.module.name());
        let result = sync_module(ctx, step.module, build, step.should_package, &results).await?;
        results.insert(step.module.name().full(), result);
    }
    Ok(results)
}

/// Sync the dependencies of `module`, then build and pack it as asked.
pub async fn sync_module(
    ctx: &SyncContext,
    module: &Module,
    should_build: bool,
    should_package: bool,
    prior: &SyncResults,
) -> Result<SyncResult> {
    if module.has_lockfile() {
        sync_locked(ctx, module, prior).await?;
    } else {
        sync_live(ctx, module).await?;
    }

    if should_build {
        build_if_changed(ctx, module).await?;
    }

    if !should_package {
        return Ok(SyncResult::default());
    }
    let packed = ctx.packager().pack(module).await?;
    Ok(SyncResult {
        actual_integrity: Some(packed.integrity),
    })
}

async fn sync_locked(ctx: &SyncContext, module: &Module, prior: &SyncResults) -> Result<()> {
    let lockfile = Lockfile::load_optional(&module.lockfile_path())?;
    let mut install = lockfile.is_none() || !module.path().join("node_modules").is_dir();

    for dep in direct_deps(ctx.workspace(), module)? {
        let name = dep.name().full();
        let installed = module.install_path_of(dep.name());
        if installed.is_symlink() {
            tracing::debug!("{name} is linked into {}", module.name());
            continue;
        }
        if !installed.exists() {
            tracing::info!("reinstalling {} because {name} is not installed", module.name());
            install = true;
            continue;
        }
        if lockfile.as_ref().is_some_and(|l| l.integrity_of(&name).is_none()) {
            tracing::info!("reinstalling {name} into {} because the lockfile lacks it", module.name());
            std::fs::remove_dir_all(&installed)?;
            install = true;
        }
    }

    // every local module the lockfile pins, including ones pulled in
    // through other dependencies
    if let Some(lockfile) = &lockfile {
        for name in lockfile.package_names() {
            let Some(local) = ctx.workspace().module(&name) else {
                continue;
            };
            let installed = module.install_path_of(local.name());
            if installed.is_symlink() || !installed.exists() {
                continue;
            }
            let recorded = lockfile.integrity_of(&name);
            let actual = prior.get(&name).and_then(|r| r.actual_integrity.as_ref());
            if let (Some(recorded), Some(actual)) = (recorded, actual) {
                if !recorded.matches(actual) {
                    tracing::info!("reinstalling {name} into {} because it changed", module.name());
                    std::fs::remove_dir_all(&installed)?;
                    install = true;
                }
            }
        }
    }

    if !install {
        return Ok(());
    }
    if !module.use_npm() {
        tracing::warn!("{} is not managed by npm; skipping install", module.name());
        return Ok(());
    }
    npm::install(ctx, module).await
}

async fn sync_live(ctx: &SyncContext, module: &Module) -> Result<()> {
    if needs_first_install(module)? {
        npm::install(ctx, module).await?;
    }
    for dep in direct_deps(ctx.workspace(), module)? {
        quick_sync(dep, module, ctx.transforms())?;
    }
    Ok(())
}
