//! Running npm inside a module against the registry proxy.
//!
//! Every run in a module that pins its dependencies is wrapped in lockfile
//! maintenance: integrity of local modules is refreshed before npm starts
//! and `resolved` URLs are mapped back to real registries if npm rewrote
//! the lockfile.

use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

use tandem_core::Module;
use tandem_registry::Lockfile;

use crate::context::SyncContext;
use crate::error::Result;

/// Environment that points npm at the proxy for `module`.
pub fn npm_env(ctx: &SyncContext, module: &Module) -> Result<Vec<(String, String)>> {
    let registry = format!("{}/", ctx.registry_url()?.trim_end_matches('/'));
    let mut env = vec![("npm_config_registry".to_string(), registry.clone())];
    for (scope, _) in ctx.workspace().npm().scoped_registries() {
        env.push((format!("npm_config_{scope}:registry"), registry.clone()));
    }
    env.push((
        "npm_config_package-lock".to_string(),
        module.has_lockfile().to_string(),
    ));
    Ok(env)
}

/// Run `npm <args>` in `module` with output shown to the user.
pub async fn run<I, S>(ctx: &SyncContext, module: &Module, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let lockfile_path = module.lockfile_path();
    let pinned = module.has_lockfile() && lockfile_path.is_file();
    if pinned {
        refresh_integrity(ctx, module).await?;
    }
    let before = modified(&lockfile_path);

    ctx.npm(args)
        .current_dir(module.path())
        .envs(npm_env(ctx, module)?)
        .run()
        .await?;

    if module.has_lockfile() && modified(&lockfile_path) != before {
        restore_resolved(ctx, module)?;
    }
    Ok(())
}

/// `npm install` followed by `npm prune`.
pub async fn install(ctx: &SyncContext, module: &Module) -> Result<()> {
    tracing::info!("installing dependencies of {}", module.name());
    run(ctx, module, ["install"]).await?;
    run(ctx, module, ["prune"]).await
}

/// Give every lockfile entry naming a local module the integrity of that
/// module's current tarball. Returns the number of entries changed.
pub async fn refresh_integrity(ctx: &SyncContext, module: &Module) -> Result<usize> {
    let Some(mut lockfile) = Lockfile::load_optional(&module.lockfile_path())? else {
        return Ok(0);
    };
    let mut integrities = HashMap::new();
    for name in lockfile.package_names() {
        let Some(local) = ctx.workspace().module(&name) else {
            continue;
        };
        let packed = ctx.packager().pack(local).await?;
        integrities.insert(name, packed.integrity);
    }
    let changed = lockfile.set_integrity(&integrities);
    if changed > 0 {
        tracing::debug!("updated {changed} integrity entries in {}", lockfile.path().display());
        lockfile.save()?;
    }
    Ok(changed)
}

/// Map proxy URLs in the lockfile back to real registry URLs.
pub fn restore_resolved(ctx: &SyncContext, module: &Module) -> Result<usize> {
    let Some(mut lockfile) = Lockfile::load_optional(&module.lockfile_path())? else {
        return Ok(0);
    };
    let changed = lockfile.restore_resolved(ctx.workspace().npm());
    if changed > 0 {
        tracing::debug!("restored {changed} resolved URLs in {}", lockfile.path().display());
        lockfile.save()?;
    }
    Ok(changed)
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
