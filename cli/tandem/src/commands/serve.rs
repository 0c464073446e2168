//! `tandem serve`: run the registry proxy until interrupted.

use anyhow::{Context, Result};

use super::App;

pub async fn run(app: &App, port: u16) -> Result<()> {
    let session = app.start_session(port).await?;
    println!("Registry proxy listening on {}", session.context().registry_url()?);
    println!("Press Ctrl-C to stop");

    let signal = tokio::signal::ctrl_c().await;
    session.stop().await;
    signal.context("failed to wait for Ctrl-C")
}
