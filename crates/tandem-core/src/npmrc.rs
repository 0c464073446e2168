//! npm configuration (`.npmrc`).
//!
//! Only the keys that affect registry routing are interpreted:
//! `registry`, `@scope:registry` and `//host/path/:_authToken`.

use std::collections::BTreeMap;
use std::path::Path;

use url::Url;

use crate::error::{CoreError, Result};
use crate::module::ModuleName;

pub const NPMRC_FILE: &str = ".npmrc";

/// Registry used when no `.npmrc` names a default.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Registry routing extracted from one or more `.npmrc` files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpmConfig {
    default_registry: Option<String>,
    /// Keyed by scope including the `@`.
    scoped: BTreeMap<String, String>,
    /// Keyed by `host[:port]`.
    tokens: BTreeMap<String, String>,
}

impl NpmConfig {
    /// Parse `.npmrc` text, expanding `${VAR}` from the process environment.
    pub fn parse(input: &str) -> Self {
        Self::parse_with(input, |name| std::env::var(name).ok())
    }

    /// Parse `.npmrc` text with a custom variable lookup.
    pub fn parse_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = NpmConfig::default();
        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = expand_vars(unquote(value.trim()), &lookup);

            if key == "registry" {
                config.default_registry = Some(value);
            } else if let Some(scope) = key.strip_suffix(":registry") {
                config.scoped.insert(scope.to_string(), value);
            } else if let Some(registry) = key.strip_suffix(":_authToken") {
                if let Some(host) = host_of(registry) {
                    config.tokens.insert(host, value);
                }
            }
        }
        config
    }

    /// Load the project `.npmrc` from `project_dir` layered over the one in
    /// `home_dir`. Missing files are skipped.
    pub fn load(project_dir: &Path, home_dir: Option<&Path>) -> Result<Self> {
        let mut config = NpmConfig::default();
        if let Some(home) = home_dir {
            if let Some(profile) = Self::load_file(&home.join(NPMRC_FILE))? {
                config.merge(profile);
            }
        }
        if let Some(project) = Self::load_file(&project_dir.join(NPMRC_FILE))? {
            config.merge(project);
        }
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                tracing::debug!("loaded npm config from {}", path.display());
                Ok(Some(Self::parse(&content)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Config {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }),
        }
    }

    /// Overlay `other` on top of `self`; its values win.
    pub fn merge(&mut self, other: NpmConfig) {
        if other.default_registry.is_some() {
            self.default_registry = other.default_registry;
        }
        self.scoped.extend(other.scoped);
        self.tokens.extend(other.tokens);
    }

    pub fn default_registry(&self) -> &str {
        self.default_registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    /// Registry configured for a scope (with or without the leading `@`).
    pub fn scoped_registry(&self, scope: &str) -> Option<&str> {
        let key = if scope.starts_with('@') {
            scope.to_string()
        } else {
            format!("@{scope}")
        };
        self.scoped.get(&key).map(String::as_str)
    }

    /// All `(@scope, registry)` pairs.
    pub fn scoped_registries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.scoped.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The registry serving `name`: its scope's registry if configured,
    /// the default registry otherwise.
    pub fn registry_for(&self, name: &ModuleName) -> &str {
        name.scope()
            .and_then(|scope| self.scoped_registry(scope))
            .unwrap_or_else(|| self.default_registry())
    }

    /// Bearer token for the host serving `url`.
    pub fn token_for_url(&self, url: &Url) -> Option<&str> {
        let host = url.host_str()?;
        let key = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        self.tokens.get(&key).map(String::as_str)
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Expand `${VAR}` references. Unknown variables expand to nothing.
fn expand_vars(value: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&lookup(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// `host[:port]` of a registry key such as `//npm.acme.io/repo/`.
fn host_of(registry: &str) -> Option<String> {
    let absolute = if registry.starts_with("//") {
        format!("http:{registry}")
    } else {
        registry.to_string()
    };
    let url = Url::parse(&absolute).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
