//! Local npm registry proxy for tandem.
//!
//! npm is pointed at this proxy while tandem installs dependencies of a
//! local module. Requests for other local modules are answered with
//! tarballs packed from their working copies; everything else passes
//! through to the upstream registry, with tarballs cached on disk.
//!
//! # Architecture
//!
//! - [`Packager`] turns a module's publish subset into an `npm pack` tarball
//! - [`Proxy`] serves packuments and tarballs over HTTP
//! - [`Upstream`] abstracts the real registries behind the proxy
//! - [`Lockfile`] keeps `package-lock.json` consistent with what the proxy serves

pub mod cache;
pub mod client;
pub mod error;
pub mod lockfile;
pub mod packager;
pub mod packument;
pub mod paths;
pub mod server;

// Re-exports for convenience.
pub use cache::TarballCache;
pub use client::{HttpUpstream, Upstream, UpstreamResponse};
pub use error::{RegistryError, Result};
pub use lockfile::Lockfile;
pub use packager::{PackResult, Packager};
pub use paths::{resolve_registry_url, TarballSource};
pub use server::{Proxy, ProxyServer};
