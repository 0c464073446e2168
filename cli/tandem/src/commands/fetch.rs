//! `tandem fetch`: clone missing modules, then install what was never
//! installed.

use anyhow::Result;
use tandem_sync::{clone_missing, install_missing};

use super::App;

pub async fn run(app: &App, install: bool) -> Result<()> {
    let cloned = clone_missing(app.context()).await?;
    if cloned.is_empty() {
        println!("All modules are checked out");
    }
    for name in &cloned {
        println!("Cloned {name}");
    }
    if !install {
        return Ok(());
    }

    let session = app.start_session(0).await?;
    let result = install_missing(session.context()).await;
    session.stop().await;
    for name in result? {
        println!("Installed dependencies of {name}");
    }
    Ok(())
}
