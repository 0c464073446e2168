//! `tandem publish`.

use std::path::Path;

use anyhow::{Context, Result};
use tandem_sync::{publish, PublishOptions, PublishOutcome};

use super::App;

pub async fn run(app: &App, path: &Path, new_version: Option<String>) -> Result<()> {
    let module = app.workspace().require_module_at(path)?;
    let options = PublishOptions { new_version };
    let outcome = publish(app.context(), module, &options)
        .await
        .with_context(|| format!("failed to publish {}", module.name()))?;
    match outcome {
        PublishOutcome::UpToDate { version } => {
            println!("{}@{version} is already published and unchanged", module.name())
        }
        PublishOutcome::Published { version } => println!("Published {}@{version}", module.name()),
    }
    Ok(())
}
