//! `tandem sync` and `tandem sync-all`.

use std::path::Path;

use anyhow::Result;
use tandem_core::Module;
use tandem_sync::{run_plan, SyncPlan};

use super::App;

/// Sync the module containing `path` and everything it depends on.
pub async fn run(app: &App, path: &Path, build: bool) -> Result<()> {
    let root = app.workspace().require_module_at(path)?;
    sync_roots(app, &[root], build).await
}

/// Sync every configured module.
pub async fn run_all(app: &App, build: bool) -> Result<()> {
    let roots: Vec<&Module> = app.workspace().modules().collect();
    sync_roots(app, &roots, build).await
}

async fn sync_roots(app: &App, roots: &[&Module], build: bool) -> Result<()> {
    let plan = SyncPlan::new(app.workspace(), roots)?;
    tracing::debug!("sync plan:\n{plan}");

    let session = app.start_session(0).await?;
    let result = run_plan(session.context(), &plan, build).await;
    session.stop().await;

    let results = result?;
    let packed = results.values().filter(|r| r.actual_integrity.is_some()).count();
    tracing::info!("synced {} modules ({packed} packed)", results.len());
    Ok(())
}
