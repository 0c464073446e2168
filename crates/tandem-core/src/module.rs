//! The module model: a locally managed npm package.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{CoreError, Result};

/// File name of the npm lockfile.
pub const LOCKFILE: &str = "package-lock.json";

/// An npm package name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName {
    scope: Option<String>,
    pkg: String,
}

impl ModuleName {
    /// Parse `pkg`, `@scope/pkg` or `scope/pkg`.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidName {
            name: name.to_string(),
        };
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }
        match trimmed.split_once('/') {
            Some((scope, pkg)) => {
                let scope = scope.strip_prefix('@').unwrap_or(scope);
                if scope.is_empty() || pkg.is_empty() || pkg.contains('/') {
                    return Err(invalid());
                }
                Ok(ModuleName {
                    scope: Some(scope.to_string()),
                    pkg: pkg.to_string(),
                })
            }
            None if trimmed.starts_with('@') => Err(invalid()),
            None => Ok(ModuleName {
                scope: None,
                pkg: trimmed.to_string(),
            }),
        }
    }

    /// Scope without the leading `@`.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Package part of the name.
    pub fn pkg(&self) -> &str {
        &self.pkg
    }

    /// Full npm name, `@scope/pkg` or `pkg`.
    pub fn full(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{scope}/{}", self.pkg),
            None => self.pkg.clone(),
        }
    }

    /// Name of the tarball `npm pack` writes for this package.
    pub fn tarball_file_name(&self, version: &str) -> String {
        match &self.scope {
            Some(scope) => format!("{scope}-{}-{version}.tgz", self.pkg),
            None => format!("{}-{version}.tgz", self.pkg),
        }
    }

    /// Relative directory the package occupies inside `node_modules`.
    pub fn install_dir(&self) -> PathBuf {
        match &self.scope {
            Some(scope) => Path::new(&format!("@{scope}")).join(&self.pkg),
            None => PathBuf::from(&self.pkg),
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "@{scope}/{}", self.pkg),
            None => write!(f, "{}", self.pkg),
        }
    }
}

/// Plain configuration of a module before its patterns are compiled.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub name: ModuleName,
    pub path: PathBuf,
    pub repository: Option<String>,
    pub branch: String,
    pub use_npm: bool,
    pub build_commands: Vec<String>,
    pub build_triggers: Vec<String>,
    pub ignore_file: Option<PathBuf>,
    /// `None` means "use a lockfile if `package-lock.json` exists".
    pub lockfile: Option<bool>,
}

impl ModuleSpec {
    /// A spec with default policies for a module at `path`.
    pub fn new(name: ModuleName, path: impl Into<PathBuf>) -> Self {
        ModuleSpec {
            name,
            path: path.into(),
            repository: None,
            branch: "master".to_string(),
            use_npm: true,
            build_commands: Vec::new(),
            build_triggers: Vec::new(),
            ignore_file: None,
            lockfile: None,
        }
    }
}

/// A locally managed package. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Module {
    name: ModuleName,
    path: PathBuf,
    repository: Option<String>,
    branch: String,
    use_npm: bool,
    build_commands: Vec<String>,
    triggers: Option<GlobSet>,
    ignore_file: Option<PathBuf>,
    ignore: Option<Gitignore>,
    lockfile: Option<bool>,
}

impl Module {
    /// Build a module, compiling its trigger globs and ignore rules.
    pub fn new(spec: ModuleSpec) -> Result<Self> {
        let triggers = compile_triggers(&spec.build_triggers)?;
        let ignore = match &spec.ignore_file {
            Some(file) => load_ignore_rules(&spec.path, file)?,
            None => None,
        };
        Ok(Module {
            name: spec.name,
            path: spec.path,
            repository: spec.repository,
            branch: spec.branch,
            use_npm: spec.use_npm,
            build_commands: spec.build_commands,
            triggers,
            ignore_file: spec.ignore_file,
            ignore,
            lockfile: spec.lockfile,
        })
    }

    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Whether dependencies of this module are installed with npm.
    pub fn use_npm(&self) -> bool {
        self.use_npm
    }

    pub fn build_commands(&self) -> &[String] {
        &self.build_commands
    }

    pub fn ignore_file(&self) -> Option<&Path> {
        self.ignore_file.as_deref()
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.path.join(LOCKFILE)
    }

    /// Whether installs of this module are pinned by a lockfile.
    pub fn has_lockfile(&self) -> bool {
        self.lockfile
            .unwrap_or_else(|| self.lockfile_path().is_file())
    }

    /// Where this module's copy of `dependency` is installed.
    pub fn install_path_of(&self, dependency: &ModuleName) -> PathBuf {
        self.path.join("node_modules").join(dependency.install_dir())
    }

    /// Whether a path (relative to the module root) matches a build trigger.
    ///
    /// With no triggers configured every file matches. Patterns are tried
    /// against the full relative path and against the file name alone.
    pub fn matches_build_trigger(&self, relative: &Path) -> bool {
        let Some(triggers) = &self.triggers else {
            return true;
        };
        if triggers.is_match(relative) {
            return true;
        }
        relative
            .file_name()
            .is_some_and(|base| triggers.is_match(Path::new(base)))
    }

    /// Whether a path (relative to the module root) is excluded by the
    /// module's custom ignore file.
    pub fn is_ignored(&self, relative: &Path, is_dir: bool) -> bool {
        match &self.ignore {
            Some(rules) => rules
                .matched_path_or_any_parents(relative, is_dir)
                .is_ignore(),
            None => false,
        }
    }
}

fn compile_triggers(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| CoreError::InvalidPattern {
            pattern: pattern.clone(),
            detail: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map(Some).map_err(|e| CoreError::InvalidPattern {
        pattern: patterns.join(", "),
        detail: e.to_string(),
    })
}

fn load_ignore_rules(root: &Path, file: &Path) -> Result<Option<Gitignore>> {
    if !file.is_file() {
        tracing::debug!("ignore file {} does not exist", file.display());
        return Ok(None);
    }
    let mut builder = GitignoreBuilder::new(root);
    if let Some(err) = builder.add(file) {
        return Err(CoreError::InvalidPattern {
            pattern: file.display().to_string(),
            detail: err.to_string(),
        });
    }
    let rules = builder.build().map_err(|e| CoreError::InvalidPattern {
        pattern: file.display().to_string(),
        detail: e.to_string(),
    })?;
    Ok(Some(rules))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scoped_names() {
        let name = ModuleName::parse("@acme/widgets").unwrap();
        assert_eq!(name.scope(), Some("acme"));
        assert_eq!(name.pkg(), "widgets");
        assert_eq!(name.full(), "@acme/widgets");

        // the leading @ is optional
        let name = ModuleName::parse("acme/widgets").unwrap();
        assert_eq!(name.to_string(), "@acme/widgets");
    }

    #[test]
    fn parse_unscoped_name() {
        let name = ModuleName::parse("left-pad").unwrap();
        assert_eq!(name.scope(), None);
        assert_eq!(name.full(), "left-pad");
    }

    #[test]
    fn reject_bad_names() {
        for bad in ["", "@", "@acme", "@/x", "a/", "a/b/c"] {
            assert!(ModuleName::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn tarball_names() {
        let scoped = ModuleName::parse("@acme/widgets").unwrap();
        assert_eq!(scoped.tarball_file_name("1.0.0"), "acme-widgets-1.0.0.tgz");
        let plain = ModuleName::parse("widgets").unwrap();
        assert_eq!(plain.tarball_file_name("1.0.0"), "widgets-1.0.0.tgz");
    }

    #[test]
    fn install_path() {
        let app = Module::new(ModuleSpec::new(
            ModuleName::parse("app").unwrap(),
            "/work/app",
        ))
        .unwrap();
        let dep = ModuleName::parse("@acme/core").unwrap();
        assert_eq!(
            app.install_path_of(&dep),
            PathBuf::from("/work/app/node_modules/@acme/core")
        );
    }

    #[test]
    fn triggers_match_base_and_relative() {
        let mut spec = ModuleSpec::new(ModuleName::parse("lib").unwrap(), "/work/lib");
        spec.build_triggers = vec!["*.ts".to_string(), "src/**/*.json".to_string()];
        let module = Module::new(spec).unwrap();

        assert!(module.matches_build_trigger(Path::new("index.ts")));
        assert!(module.matches_build_trigger(Path::new("deep/nested/file.ts")));
        assert!(module.matches_build_trigger(Path::new("src/conf/a.json")));
        assert!(!module.matches_build_trigger(Path::new("README.md")));
        assert!(!module.matches_build_trigger(Path::new("other/a.json")));
    }

    #[test]
    fn no_triggers_match_everything() {
        let module = Module::new(ModuleSpec::new(ModuleName::parse("lib").unwrap(), "/w")).unwrap();
        assert!(module.matches_build_trigger(Path::new("anything/at/all.txt")));
    }

    #[test]
    fn invalid_trigger_is_rejected() {
        let mut spec = ModuleSpec::new(ModuleName::parse("lib").unwrap(), "/w");
        spec.build_triggers = vec!["src/[".to_string()];
        assert!(matches!(
            Module::new(spec),
            Err(CoreError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn ignore_rules_support_reinclusion() {
        let dir = tempfile::tempdir().unwrap();
        let ignore_file = dir.path().join("custom.ignore");
        std::fs::write(&ignore_file, "*.log\nbuild/\n!keep.log\n").unwrap();

        let mut spec = ModuleSpec::new(ModuleName::parse("lib").unwrap(), dir.path());
        spec.ignore_file = Some(ignore_file);
        let module = Module::new(spec).unwrap();

        assert!(module.is_ignored(Path::new("debug.log"), false));
        assert!(!module.is_ignored(Path::new("keep.log"), false));
        assert!(module.is_ignored(Path::new("build"), true));
        assert!(module.is_ignored(Path::new("build/out.js"), false));
        assert!(!module.is_ignored(Path::new("index.js"), false));
    }

    #[test]
    fn missing_ignore_file_ignores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = ModuleSpec::new(ModuleName::parse("lib").unwrap(), dir.path());
        spec.ignore_file = Some(dir.path().join("nope"));
        let module = Module::new(spec).unwrap();
        assert!(!module.is_ignored(Path::new("a.log"), false));
    }

    #[test]
    fn lockfile_policy_defaults_to_presence() {
        let dir = tempfile::tempdir().unwrap();
        let module =
            Module::new(ModuleSpec::new(ModuleName::parse("app").unwrap(), dir.path())).unwrap();
        assert!(!module.has_lockfile());
        std::fs::write(dir.path().join(LOCKFILE), "{}").unwrap();
        assert!(module.has_lockfile());

        let mut spec = ModuleSpec::new(ModuleName::parse("app").unwrap(), dir.path());
        spec.lockfile = Some(false);
        assert!(!Module::new(spec).unwrap().has_lockfile());
    }
}
