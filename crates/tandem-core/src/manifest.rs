//! `package.json` reading.
//!
//! Only the fields tandem reasons about are typed; everything else is kept
//! in [`PackageManifest::extra`] so manifests can be echoed back unchanged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// File name of an npm package manifest.
pub const MANIFEST_FILE: &str = "package.json";

/// A parsed `package.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,
    /// Remaining fields (`bin`, `engines`, `bundleDependencies`, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PackageManifest {
    /// Parse a manifest from JSON text. `path` is only used for error messages.
    pub fn parse(input: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| CoreError::InvalidManifest {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Load `package.json` from a package directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::path_in(dir);
        let content = std::fs::read_to_string(&path).map_err(|e| CoreError::InvalidManifest {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        Self::parse(&content, &path)
    }

    /// Load `package.json` if the directory has one.
    pub fn load_optional(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(dir);
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content, &path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::InvalidManifest {
                path,
                detail: e.to_string(),
            }),
        }
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// The manifest version, which must be valid semver.
    pub fn require_version(&self, dir: &Path) -> Result<&str> {
        let version = self
            .version
            .as_deref()
            .ok_or_else(|| CoreError::InvalidManifest {
                path: Self::path_in(dir),
                detail: "no version defined".to_string(),
            })?;
        semver::Version::parse(version).map_err(|e| CoreError::InvalidManifest {
            path: Self::path_in(dir),
            detail: format!("invalid version '{version}': {e}"),
        })?;
        Ok(version)
    }

    /// Names of declared dependencies, optionally including dev-dependencies.
    pub fn dependency_names(&self, include_dev: bool) -> Vec<&str> {
        let mut names: Vec<&str> = self.dependencies.keys().map(String::as_str).collect();
        if include_dev {
            for name in self.dev_dependencies.keys() {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Total count of runtime and development dependencies.
    pub fn declared_dependency_count(&self) -> usize {
        self.dependencies.len() + self.dev_dependencies.len()
    }

    pub fn has_script(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }
}
