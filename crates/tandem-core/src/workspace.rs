//! The workspace context: modules, npm configuration and tool directories,
//! built once at startup and passed to every component.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{WorkspaceConfig, CONFIG_FILE};
use crate::error::{CoreError, Result};
use crate::module::{Module, ModuleName};
use crate::npmrc::NpmConfig;

/// Directories tandem writes to outside module checkouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirs {
    /// Per-module state files.
    pub state: PathBuf,
    /// Proxied upstream tarballs.
    pub cache: PathBuf,
    /// Packager working directories.
    pub temp: PathBuf,
}

impl Dirs {
    /// Default locations, overridable by `TANDEM_STATE_DIR`,
    /// `TANDEM_CACHE_DIR` and `TANDEM_TEMP_DIR`.
    pub fn from_env() -> Self {
        let tmp = std::env::temp_dir();
        let home = dirs::home_dir().unwrap_or_else(|| tmp.clone());
        Dirs {
            state: env_path("TANDEM_STATE_DIR").unwrap_or_else(|| home.join(".tandem-state")),
            cache: env_path("TANDEM_CACHE_DIR").unwrap_or_else(|| tmp.join("tandem-cache")),
            temp: env_path("TANDEM_TEMP_DIR").unwrap_or_else(|| tmp.join("tandem")),
        }
    }

    /// All three directories under one parent.
    pub fn under(root: &Path) -> Self {
        Dirs {
            state: root.join("state"),
            cache: root.join("cache"),
            temp: root.join("temp"),
        }
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// A loaded workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    modules: BTreeMap<String, Module>,
    npm: NpmConfig,
    dirs: Dirs,
    include_dev: bool,
}

impl Workspace {
    /// Assemble a workspace from already-built modules.
    pub fn new(
        root: impl Into<PathBuf>,
        modules: Vec<Module>,
        npm: NpmConfig,
        dirs: Dirs,
    ) -> Result<Self> {
        let root = root.into();
        let mut by_name = BTreeMap::new();
        for module in modules {
            let name = module.name().full();
            if by_name.contains_key(&name) {
                return Err(CoreError::Config {
                    path: root.join(CONFIG_FILE),
                    detail: format!("duplicate module '{name}'"),
                });
            }
            by_name.insert(name, module);
        }
        Ok(Workspace {
            root,
            modules: by_name,
            npm,
            dirs,
            include_dev: true,
        })
    }

    /// Load the workspace whose `tandem.toml` is `config` (a file or the
    /// directory containing it), or the nearest one above `cwd`.
    pub fn load(config: Option<&Path>, cwd: &Path) -> Result<Self> {
        let (parsed, root, config_path) = match config {
            Some(path) => {
                let file = if path.is_dir() {
                    path.join(CONFIG_FILE)
                } else {
                    path.to_path_buf()
                };
                let root = file
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| cwd.to_path_buf());
                (WorkspaceConfig::load(&file)?, root, file)
            }
            None => {
                let (parsed, root) =
                    WorkspaceConfig::find_and_load(cwd)?.ok_or_else(|| CoreError::Config {
                        path: cwd.join(CONFIG_FILE),
                        detail: format!("no {CONFIG_FILE} found in {} or any parent", cwd.display()),
                    })?;
                let file = root.join(CONFIG_FILE);
                (parsed, root, file)
            }
        };

        let modules = parsed.resolve_modules(&root, &config_path)?;
        let home = dirs::home_dir();
        let npm = NpmConfig::load(&root, home.as_deref())?;
        tracing::debug!(
            "loaded {} modules from {}",
            modules.len(),
            config_path.display()
        );

        let mut workspace = Workspace::new(root, modules, npm, Dirs::from_env())?;
        workspace.include_dev = parsed.workspace.include_dev;
        Ok(workspace)
    }

    /// Set whether devDependencies are graph edges.
    pub fn with_include_dev(mut self, include_dev: bool) -> Self {
        self.include_dev = include_dev;
        self
    }

    /// Use other tool directories than the ones from the environment.
    pub fn with_dirs(mut self, dirs: Dirs) -> Self {
        self.dirs = dirs;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn npm(&self) -> &NpmConfig {
        &self.npm
    }

    pub fn dirs(&self) -> &Dirs {
        &self.dirs
    }

    pub fn include_dev(&self) -> bool {
        self.include_dev
    }

    /// Modules sorted by name.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Look a module up by npm name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        if let Some(module) = self.modules.get(name) {
            return Some(module);
        }
        ModuleName::parse(name)
            .ok()
            .and_then(|parsed| self.modules.get(&parsed.full()))
    }

    pub fn require_module(&self, name: &str) -> Result<&Module> {
        self.module(name).ok_or_else(|| CoreError::UnknownModule {
            what: format!("named '{name}'"),
        })
    }

    /// The module whose directory contains `path`, preferring the deepest.
    pub fn module_at(&self, path: &Path) -> Option<&Module> {
        self.modules
            .values()
            .filter(|m| path.starts_with(m.path()))
            .max_by_key(|m| m.path().components().count())
    }

    pub fn require_module_at(&self, path: &Path) -> Result<&Module> {
        self.module_at(path).ok_or_else(|| CoreError::UnknownModule {
            what: format!("at {}", path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleSpec;

    fn module(name: &str, path: &str) -> Module {
        Module::new(ModuleSpec::new(ModuleName::parse(name).unwrap(), path)).unwrap()
    }

    fn workspace(modules: Vec<Module>) -> Workspace {
        Workspace::new(
            "/work",
            modules,
            NpmConfig::default(),
            Dirs::under(Path::new("/tmp/t")),
        )
        .unwrap()
    }

    #[test]
    fn lookup_by_name() {
        let ws = workspace(vec![module("@acme/core", "/work/core"), module("app", "/work/app")]);
        assert!(ws.module("@acme/core").is_some());
        assert!(ws.module("acme/core").is_some());
        assert!(ws.module("left-pad").is_none());
        assert!(matches!(
            ws.require_module("left-pad"),
            Err(CoreError::UnknownModule { .. })
        ));
    }

    #[test]
    fn lookup_by_path_prefers_deepest() {
        let ws = workspace(vec![
            module("outer", "/work/outer"),
            module("inner", "/work/outer/packages/inner"),
        ]);
        let found = ws.module_at(Path::new("/work/outer/packages/inner/src")).unwrap();
        assert_eq!(found.name().full(), "inner");
        let found = ws.module_at(Path::new("/work/outer/lib")).unwrap();
        assert_eq!(found.name().full(), "outer");
        assert!(ws.module_at(Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn duplicates_rejected() {
        let result = Workspace::new(
            "/work",
            vec![module("a", "/work/a"), module("a", "/work/b")],
            NpmConfig::default(),
            Dirs::under(Path::new("/tmp/t")),
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_from_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[workspace]\ninclude-dev = false\n[[module]]\nname = \"lib\"\npath = \"lib\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join(".npmrc"), "registry=https://r.example/\n").unwrap();

        let ws = Workspace::load(Some(dir.path()), Path::new("/")).unwrap();
        assert_eq!(ws.module_count(), 1);
        assert!(!ws.include_dev());
        assert_eq!(ws.npm().default_registry(), "https://r.example/");
        assert_eq!(
            ws.require_module("lib").unwrap().path(),
            dir.path().join("lib")
        );
    }

    #[test]
    fn load_without_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Workspace::load(None, dir.path()).unwrap_err();
        assert!(err.to_string().contains("no tandem.toml found"));
    }
}
