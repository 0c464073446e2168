//! Publishing a module to its real registry.
//!
//! A module is published when its publish subset changed since the last
//! publish or when its current version is not on the registry yet. npm
//! talks to the registry from `.npmrc` directly here, not to the proxy.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tandem_core::files::BACKUP_DIR;
use tandem_core::{Module, PackageManifest, Subset};

use crate::build::build_if_changed;
use crate::context::SyncContext;
use crate::error::{Result, SyncError};

const NPMIGNORE: &str = ".npmignore";

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Version to set with `npm version` before publishing.
    pub new_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Nothing changed and the current version is already published.
    UpToDate { version: String },
    Published { version: String },
}

/// What the registry knows about a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryInfo {
    /// At least one version is published.
    pub on_registry: bool,
    pub versions: Vec<String>,
}

impl RegistryInfo {
    pub fn is_published(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    /// Interpret the output of `npm view --json`.
    pub fn from_view_output(name: &str, stdout: &str) -> Result<Self> {
        let query_error = |detail: String| SyncError::RegistryQuery {
            name: name.to_string(),
            detail,
        };
        let value: Value = serde_json::from_str(stdout.trim())
            .map_err(|e| query_error(format!("unexpected `npm view` output: {e}")))?;

        if let Some(error) = value.get("error") {
            if error.get("code").and_then(Value::as_str) == Some("E404") {
                return Ok(RegistryInfo::default());
            }
            let summary = error
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(query_error(summary.to_string()));
        }

        let versions = match value.get("versions") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => return Err(query_error("no versions in registry response".to_string())),
        };
        Ok(RegistryInfo {
            on_registry: true,
            versions,
        })
    }
}

/// Ask the registry about the package in `module`.
pub async fn registry_info(ctx: &SyncContext, module: &Module) -> Result<RegistryInfo> {
    let output = ctx
        .npm(["view", "--json"])
        .current_dir(module.path())
        .output_unchecked()
        .await?;
    RegistryInfo::from_view_output(&module.name().full(), &output.stdout)
}

/// Build if needed, then publish `module` if it changed or its version is
/// not published yet.
pub async fn publish(ctx: &SyncContext, module: &Module, options: &PublishOptions) -> Result<PublishOutcome> {
    if !module.use_npm() {
        return Err(SyncError::NotNpmManaged {
            name: module.name().full(),
        });
    }
    let built = build_if_changed(ctx, module).await?;
    let changed = built || ctx.state().has_changed(module, Subset::Publish)?;

    let manifest = PackageManifest::load(module.path())?;
    let current = manifest.require_version(module.path())?.to_string();
    let info = registry_info(ctx, module).await?;

    let version = match &options.new_version {
        Some(version) => {
            semver::Version::parse(version).map_err(|e| SyncError::InvalidVersion {
                version: version.clone(),
                detail: e.to_string(),
            })?;
            if info.is_published(version) {
                return Err(already_published(module, version));
            }
            ctx.npm(["version", version.as_str(), "--no-git-tag-version"])
                .current_dir(module.path())
                .output()
                .await?;
            version.clone()
        }
        None if info.is_published(&current) => {
            if !changed {
                tracing::info!("{}@{current} is up to date", module.name());
                return Ok(PublishOutcome::UpToDate { version: current });
            }
            return Err(already_published(module, &current));
        }
        None => {
            if !info.on_registry {
                tracing::info!("{} is not on the registry yet", module.name());
            }
            current
        }
    };

    tracing::info!("publishing {}@{version}", module.name());
    let swap = IgnoreSwap::install(module)?;
    let result = ctx.npm(["publish"]).current_dir(module.path()).run().await;
    if let Some(swap) = swap {
        swap.restore()?;
    }
    result?;

    ctx.state().save_actual(module, Subset::Publish)?;
    Ok(PublishOutcome::Published { version })
}

fn already_published(module: &Module, version: &str) -> SyncError {
    SyncError::AlreadyPublished {
        name: module.name().full(),
        version: version.to_string(),
    }
}

/// The module's configured ignore file, copied in as `.npmignore` for the
/// duration of a publish. An existing `.npmignore` is moved aside.
struct IgnoreSwap {
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl IgnoreSwap {
    fn install(module: &Module) -> Result<Option<Self>> {
        let Some(source) = module.ignore_file() else {
            return Ok(None);
        };
        let target = module.path().join(NPMIGNORE);
        if source == target || !source.is_file() {
            return Ok(None);
        }

        let backup = if target.exists() {
            let dir = module.path().join(BACKUP_DIR);
            std::fs::create_dir_all(&dir)?;
            let backup = dir.join(NPMIGNORE);
            std::fs::rename(&target, &backup)?;
            Some(backup)
        } else {
            None
        };
        std::fs::copy(source, &target)?;
        Ok(Some(IgnoreSwap { target, backup }))
    }

    fn restore(self) -> Result<()> {
        std::fs::remove_file(&self.target)?;
        if let Some(backup) = self.backup {
            std::fs::rename(&backup, &self.target)?;
            if let Some(dir) = backup.parent() {
                remove_if_empty(dir);
            }
        }
        Ok(())
    }
}

fn remove_if_empty(dir: &Path) {
    // fails while anything else is inside
    let _ = std::fs::remove_dir(dir);
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{fake_npm, Fixture};
    use filetime::FileTime;

    /// npm stand-in with a one-package registry kept in `<root>/published`.
    fn registry_npm(fx: &Fixture) -> String {
        let published = fx.root().join("published");
        let seen = fx.root().join("npmignore-during-publish");
        let script = format!(
            r#"case "$1" in
  view)
    if [ -f '{published}' ]; then printf '{{"versions":["%s"]}}' "$(cat '{published}')"
    else echo '{{"error":{{"code":"E404","summary":"Not found"}}}}'; exit 1; fi ;;
  version)
    sed "s/\"version\":\"[^\"]*\"/\"version\":\"$2\"/" package.json > package.tmp && mv package.tmp package.json ;;
  publish)
    sed -n 's/.*"version":"\([^"]*\)".*/\1/p' package.json > '{published}'
    cat .npmignore > '{seen}' 2>/dev/null || true ;;
esac"#,
            published = published.display(),
            seen = seen.display(),
        );
        fake_npm(fx.root(), &fx.root().join("npm.log"), &script)
    }

    #[tokio::test]
    async fn publish_lifecycle() {
        let fx = Fixture::new(&[("lib", &[])], "");
        let ctx = fx.context();
        let ctx = ctx.with_npm_program(registry_npm(&fx));
        let lib = fx.module("lib");
        let options = PublishOptions::default();

        let outcome = publish(&ctx, lib, &options).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Published { version: "1.0.0".to_string() });

        let outcome = publish(&ctx, lib, &options).await.unwrap();
        assert_eq!(outcome, PublishOutcome::UpToDate { version: "1.0.0".to_string() });

        let later = FileTime::from_unix_time(FileTime::now().unix_seconds() + 60, 0);
        filetime::set_file_mtime(lib.path().join("index.js"), later).unwrap();
        let err = publish(&ctx, lib, &options).await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyPublished { .. }));

        let options = PublishOptions {
            new_version: Some("1.1.0".to_string()),
        };
        let outcome = publish(&ctx, lib, &options).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Published { version: "1.1.0".to_string() });
        let manifest = PackageManifest::load(lib.path()).unwrap();
        assert_eq!(manifest.version.as_deref(), Some("1.1.0"));
    }

    #[tokio::test]
    async fn configured_ignore_file_is_swapped_in() {
        let fx = Fixture::new(&[("lib", &[])], "");
        let outside = fx.root().join("lib.npmignore");
        std::fs::write(&outside, "secret.txt\n").unwrap();
        let fx = fx.with_module("lib", |spec| spec.ignore_file = Some(outside.clone()));
        let lib = fx.module("lib");
        std::fs::write(lib.path().join(NPMIGNORE), "old\n").unwrap();

        let ctx = fx.context().with_npm_program(registry_npm(&fx));
        publish(&ctx, lib, &PublishOptions::default()).await.unwrap();

        let seen = std::fs::read_to_string(fx.root().join("npmignore-during-publish")).unwrap();
        assert_eq!(seen, "secret.txt\n");
        assert_eq!(std::fs::read_to_string(lib.path().join(NPMIGNORE)).unwrap(), "old\n");
        assert!(!lib.path().join(BACKUP_DIR).exists());
    }

    #[tokio::test]
    async fn invalid_new_version_is_rejected() {
        let fx = Fixture::new(&[("lib", &[])], "");
        let ctx = fx.context().with_npm_program(registry_npm(&fx));
        let options = PublishOptions {
            new_version: Some("next".to_string()),
        };
        let err = publish(&ctx, fx.module("lib"), &options).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidVersion { .. }));
    }

    #[tokio::test]
    async fn modules_outside_npm_are_refused() {
        let fx = Fixture::new(&[("lib", &[])], "").with_module("lib", |spec| spec.use_npm = false);
        let ctx = fx.context().with_npm_program(fake_npm(fx.root(), &fx.root().join("npm.log"), ""));
        let err = publish(&ctx, fx.module("lib"), &PublishOptions::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::NotNpmManaged { .. }));
    }
}
