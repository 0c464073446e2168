//! `tandem.toml` workspace configuration.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::manifest::PackageManifest;
use crate::module::{Module, ModuleName, ModuleSpec};

/// File name of the workspace configuration.
pub const CONFIG_FILE: &str = "tandem.toml";

/// The top-level configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace-wide defaults (required).
    pub workspace: WorkspaceSection,
    /// Locally managed modules.
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleEntry>,
}

/// The `[workspace]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceSection {
    /// Parent directory for module checkouts.
    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default = "default_true")]
    pub npm_install: bool,
    #[serde(default)]
    pub build_triggers: Vec<String>,
    #[serde(default)]
    pub ignore_file: Option<PathBuf>,
    /// Whether devDependencies form edges of the dependency graph.
    #[serde(default = "default_true")]
    pub include_dev: bool,
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("modules")
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_true() -> bool {
    true
}

/// One `[[module]]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Check out into `<modules-dir>/<pkg>` instead of `<modules-dir>/@scope/<pkg>`.
    #[serde(default)]
    pub ignore_scope: bool,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub npm_install: Option<bool>,
    #[serde(default)]
    pub build_commands: Vec<String>,
    #[serde(default)]
    pub build_triggers: Option<Vec<String>>,
    #[serde(default)]
    pub ignore_file: Option<PathBuf>,
    #[serde(default)]
    pub lockfile: Option<bool>,
}

impl WorkspaceConfig {
    /// Parse configuration text. `path` is only used for error messages.
    pub fn parse(input: &str, path: &Path) -> Result<Self> {
        toml::from_str(input).map_err(|e| CoreError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    /// Search upward from `start_dir` for a `tandem.toml` file, parse it and
    /// return it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Ok(Some((Self::load(&candidate)?, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Build the module list, resolving relative paths against `root`.
    pub fn resolve_modules(&self, root: &Path, config_path: &Path) -> Result<Vec<Module>> {
        let modules_dir = root.join(&self.workspace.modules_dir);
        let mut seen = BTreeSet::new();
        let mut modules = Vec::with_capacity(self.modules.len());

        for (index, entry) in self.modules.iter().enumerate() {
            let config_error = |detail: String| CoreError::Config {
                path: config_path.to_path_buf(),
                detail: format!("module #{}: {detail}", index + 1),
            };

            let explicit_path = entry.path.as_ref().map(|p| root.join(p));
            let name = match &entry.name {
                Some(name) => ModuleName::parse(name)?,
                None => derive_name(explicit_path.as_deref(), entry.repository.as_deref())?
                    .ok_or_else(|| {
                        config_error(
                            "needs a name, a path with package.json, or a repository".to_string(),
                        )
                    })?,
            };
            if !seen.insert(name.full()) {
                return Err(config_error(format!("duplicate module '{name}'")));
            }

            let path = explicit_path.unwrap_or_else(|| {
                if entry.ignore_scope {
                    modules_dir.join(name.pkg())
                } else {
                    modules_dir.join(name.install_dir())
                }
            });

            let ignore_file = entry
                .ignore_file
                .as_ref()
                .or(self.workspace.ignore_file.as_ref())
                .map(|f| root.join(f));

            modules.push(Module::new(ModuleSpec {
                name,
                path,
                repository: entry.repository.clone(),
                branch: entry
                    .branch
                    .clone()
                    .unwrap_or_else(|| self.workspace.default_branch.clone()),
                use_npm: entry.npm_install.unwrap_or(self.workspace.npm_install),
                build_commands: entry.build_commands.clone(),
                build_triggers: entry
                    .build_triggers
                    .clone()
                    .unwrap_or_else(|| self.workspace.build_triggers.clone()),
                ignore_file,
                lockfile: entry.lockfile,
            })?);
        }
        Ok(modules)
    }
}

/// Name from `<path>/package.json`, falling back to the repository URL.
fn derive_name(path: Option<&Path>, repository: Option<&str>) -> Result<Option<ModuleName>> {
    if let Some(path) = path {
        if let Some(name) = PackageManifest::load_optional(path)?.and_then(|m| m.name) {
            return ModuleName::parse(&name).map(Some);
        }
    }
    match repository.and_then(repository_full_name) {
        Some(name) => ModuleName::parse(&name).map(Some),
        None => Ok(None),
    }
}

/// `owner/repo` of a git URL such as `git@host:owner/repo.git` or
/// `https://host/owner/repo`.
pub fn repository_full_name(repository: &str) -> Option<String> {
    let trimmed = repository.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let segments: Vec<&str> = trimmed
        .rsplit(['/', ':'])
        .take(2)
        .filter(|s| !s.is_empty())
        .collect();
    match segments.as_slice() {
        [repo, owner] if !owner.contains('@') && !owner.contains('.') => {
            Some(format!("{owner}/{repo}"))
        }
        [repo, ..] => Some(repo.to_string()),
        [] => None,
    }
}
