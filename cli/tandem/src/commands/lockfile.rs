//! `tandem lockfile`: create and refresh lockfiles of modules that pin
//! their dependencies.

use anyhow::{Context, Result};
use tandem_sync::{npm, SyncContext};

use super::App;

pub async fn run(app: &App) -> Result<()> {
    let session = app.start_session(0).await?;
    let result = refresh_all(session.context()).await;
    session.stop().await;
    result
}

async fn refresh_all(ctx: &SyncContext) -> Result<()> {
    for module in ctx.workspace().modules().filter(|m| m.has_lockfile()) {
        if !module.path().is_dir() {
            tracing::warn!("{} is not checked out; skipping", module.name());
            continue;
        }
        if !module.lockfile_path().is_file() {
            tracing::info!("creating lockfile of {}", module.name());
            npm::run(ctx, module, ["install", "--package-lock-only"])
                .await
                .with_context(|| format!("failed to create lockfile of {}", module.name()))?;
        }
        let integrity = npm::refresh_integrity(ctx, module).await?;
        let resolved = npm::restore_resolved(ctx, module)?;
        println!(
            "{}: {integrity} integrity and {resolved} resolved entries updated",
            module.name()
        );
    }
    Ok(())
}
