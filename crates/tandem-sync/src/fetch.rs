//! Fetching module checkouts and running their first install.

use tandem_core::files::has_visible_entries;
use tandem_core::{walk_order, Module, PackageManifest};

use crate::build::build_if_changed;
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::npm;

/// Whether `module` declares dependencies but has never had them installed.
pub fn needs_first_install(module: &Module) -> Result<bool> {
    if !module.use_npm() {
        return Ok(false);
    }
    let Some(manifest) = PackageManifest::load_optional(module.path())? else {
        return Ok(false);
    };
    Ok(manifest.declared_dependency_count() > 0
        && !has_visible_entries(&module.path().join("node_modules")))
}

/// Clone every module whose directory does not exist yet. Returns the
/// names of the cloned modules.
pub async fn clone_missing(ctx: &SyncContext) -> Result<Vec<String>> {
    let mut cloned = Vec::new();
    for module in ctx.workspace().modules() {
        if module.path().exists() {
            continue;
        }
        let repository = module.repository().ok_or_else(|| SyncError::NoRepository {
            name: module.name().full(),
            path: module.path().to_path_buf(),
        })?;
        if let Some(parent) = module.path().parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!("cloning {} from {repository}", module.name());
        ctx.git([
            "clone".to_string(),
            "-b".to_string(),
            module.branch().to_string(),
            repository.to_string(),
            module.path().display().to_string(),
        ])
        .run()
        .await?;
        cloned.push(module.name().full());
    }
    Ok(cloned)
}

/// In dependency order, install modules that were never installed and
/// rebuild what changed. Returns the names of the installed modules.
pub async fn install_missing(ctx: &SyncContext) -> Result<Vec<String>> {
    let workspace = ctx.workspace();
    let roots: Vec<&Module> = workspace.modules().collect();
    let mut installed = Vec::new();
    for module in walk_order(workspace, &roots)? {
        if needs_first_install(module)? {
            npm::install(ctx, module).await?;
            installed.push(module.name().full());
        }
        build_if_changed(ctx, module).await?;
    }
    Ok(installed)
}
