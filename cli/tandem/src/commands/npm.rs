//! `tandem npm`: npm in the current module, resolving local modules
//! through the proxy.

use std::path::Path;

use anyhow::Result;

use super::App;

pub async fn run(app: &App, cwd: &Path, args: Vec<String>) -> Result<()> {
    let module = app.workspace().require_module_at(cwd)?;
    let session = app.start_session(0).await?;
    let result = tandem_sync::npm::run(session.context(), module, args).await;
    session.stop().await;
    Ok(result?)
}
