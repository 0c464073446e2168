//! The per-run context shared by every synchronization step.

use std::sync::Arc;

use tandem_core::{default_transforms, Process, StateStore, Transform, Workspace};
use tandem_registry::{Packager, Proxy, ProxyServer, TarballCache, Upstream};

use crate::error::{Result, SyncError};

/// The workspace plus the services built around it for one run.
#[derive(Debug, Clone)]
pub struct SyncContext {
    workspace: Arc<Workspace>,
    state: StateStore,
    packager: Packager,
    transforms: Vec<Transform>,
    npm_program: String,
    git_program: String,
    registry_url: Option<String>,
}

impl SyncContext {
    /// A context with the state store and packager placed in the
    /// workspace's tool directories.
    pub fn new(workspace: Arc<Workspace>) -> Self {
        let state = StateStore::new(workspace.dirs().state.clone());
        let packager = Packager::new(workspace.dirs().temp.clone(), state.clone());
        SyncContext {
            workspace,
            state,
            packager,
            transforms: default_transforms(),
            npm_program: tandem_core::process::npm_program().to_string(),
            git_program: "git".to_string(),
            registry_url: None,
        }
    }

    pub fn with_packager(mut self, packager: Packager) -> Self {
        self.packager = packager;
        self
    }

    pub fn with_npm_program(mut self, program: impl Into<String>) -> Self {
        self.npm_program = program.into();
        self
    }

    pub fn with_git_program(mut self, program: impl Into<String>) -> Self {
        self.git_program = program.into();
        self
    }

    /// Point npm runs at a registry proxy listening on `url`.
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = Some(url.into());
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn packager(&self) -> &Packager {
        &self.packager
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    /// Address of the running proxy.
    pub fn registry_url(&self) -> Result<&str> {
        self.registry_url.as_deref().ok_or(SyncError::ProxyNotRunning)
    }

    /// npm with the given arguments.
    pub fn npm<I, S>(&self, args: I) -> Process
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Process::new(self.npm_program.clone()).args(args)
    }

    /// git with the given arguments.
    pub fn git<I, S>(&self, args: I) -> Process
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Process::new(self.git_program.clone()).args(args)
    }
}

/// A context with a registry proxy running in the background.
pub struct Session {
    context: SyncContext,
    server: ProxyServer,
}

impl Session {
    /// Start the proxy on `port` (0 picks a free one) and point `context`
    /// at it.
    pub async fn start(context: SyncContext, upstream: Arc<dyn Upstream>, port: u16) -> Result<Self> {
        let cache = TarballCache::new(context.workspace().dirs().cache.clone());
        let proxy = Proxy::new(
            context.workspace.clone(),
            context.packager.clone(),
            cache,
            upstream,
        );
        let server = proxy.start(port).await?;
        let context = context.with_registry_url(server.url());
        Ok(Session { context, server })
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// Shut the proxy down.
    pub async fn stop(self) {
        self.server.stop().await;
    }
}
