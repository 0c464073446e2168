//! CLI command implementations.

pub mod clean;
pub mod fetch;
pub mod list;
pub mod lockfile;
pub mod npm;
pub mod publish;
pub mod serve;
pub mod sync;
pub mod tree;

use std::sync::Arc;

use anyhow::{Context, Result};
use tandem_core::Workspace;
use tandem_registry::{HttpUpstream, Upstream};
use tandem_sync::{Session, SyncContext};

/// The loaded workspace and the services commands run against.
pub struct App {
    ctx: SyncContext,
    upstream: Arc<dyn Upstream>,
}

impl App {
    pub fn new(workspace: Arc<Workspace>) -> Result<Self> {
        Self::with_context(SyncContext::new(workspace))
    }

    /// Use a prepared context; upstream registries come from its `.npmrc`.
    pub fn with_context(ctx: SyncContext) -> Result<Self> {
        let upstream = HttpUpstream::new(ctx.workspace().npm().clone())
            .context("failed to set up the upstream registry client")?;
        Ok(App {
            ctx,
            upstream: Arc::new(upstream),
        })
    }

    pub fn workspace(&self) -> &Workspace {
        self.ctx.workspace()
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Start the registry proxy on `port`. Callers must [`Session::stop`] it.
    pub async fn start_session(&self, port: u16) -> Result<Session> {
        Session::start(self.ctx.clone(), self.upstream.clone(), port)
            .await
            .context("failed to start the registry proxy")
    }
}
