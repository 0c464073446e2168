//! Reading and rewriting `package-lock.json`.
//!
//! Two rewrites are applied around npm runs in modules that pin their
//! dependencies:
//!
//! - before npm runs, entries for local modules get the integrity of the
//!   tarball the proxy is about to serve, so npm accepts it;
//! - after npm changed the lockfile, `resolved` URLs pointing at the proxy
//!   are mapped back to real registry URLs.
//!
//! The `dependencies` tree of lockfile versions 1 and 2 and the `packages`
//! map of version 2 are both updated. Every other field is kept as is.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tandem_core::{Integrity, NpmConfig};

use crate::error::{RegistryError, Result};
use crate::paths::resolve_registry_url;

const SUPPORTED_VERSIONS: &[u64] = &[1, 2];

/// A parsed lockfile.
#[derive(Debug, Clone)]
pub struct Lockfile {
    path: PathBuf,
    content: Value,
}

impl Lockfile {
    /// Parse lockfile text. `path` is where [`Lockfile::save`] writes.
    pub fn parse(input: &str, path: &Path) -> Result<Self> {
        let invalid = |detail: String| RegistryError::InvalidLockfile {
            path: path.to_path_buf(),
            detail,
        };
        let content: Value = serde_json::from_str(input).map_err(|e| invalid(e.to_string()))?;
        if !content.is_object() {
            return Err(invalid("top level is not an object".to_string()));
        }
        let version = match content.get("lockfileVersion") {
            None => 1,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| invalid(format!("lockfileVersion {v} is not a number")))?,
        };
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(RegistryError::UnsupportedLockfile {
                path: path.to_path_buf(),
                version,
            });
        }
        Ok(Lockfile {
            path: path.to_path_buf(),
            content,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path).map_err(|e| RegistryError::InvalidLockfile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::parse(&input, path)
    }

    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write back as 2-space indented JSON with a trailing newline.
    pub fn save(&self) -> Result<()> {
        let mut text = serde_json::to_string_pretty(&self.content)?;
        text.push('\n');
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    /// Every package name recorded anywhere in the lockfile.
    pub fn package_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        if let Some(deps) = self.content.get("dependencies").and_then(Value::as_object) {
            collect_names(deps, &mut names);
        }
        if let Some(packages) = self.content.get("packages").and_then(Value::as_object) {
            names.extend(packages.keys().filter_map(|k| package_name(k).map(str::to_string)));
        }
        names
    }

    /// Integrity recorded for the top-level install of `name`.
    pub fn integrity_of(&self, name: &str) -> Option<Integrity> {
        let from_packages = self
            .content
            .get("packages")
            .and_then(|p| p.get(format!("node_modules/{name}")))
            .and_then(|e| e.get("integrity"));
        let from_dependencies = self
            .content
            .get("dependencies")
            .and_then(|d| d.get(name))
            .and_then(|e| e.get("integrity"));
        from_packages
            .or(from_dependencies)
            .and_then(Value::as_str)
            .map(Integrity::from_string)
    }

    /// Overwrite `integrity` of every entry named in `integrities`.
    /// Returns the number of entries changed.
    pub fn set_integrity(&mut self, integrities: &HashMap<String, Integrity>) -> usize {
        let mut changed = 0;
        self.for_each_entry_mut(&mut |name, entry| {
            let Some(integrity) = integrities.get(name) else {
                return;
            };
            let value = Value::String(integrity.as_str().to_string());
            if entry.get("integrity") != Some(&value) {
                entry.insert("integrity".to_string(), value);
                changed += 1;
            }
        });
        changed
    }

    /// Map every proxy `resolved` URL back to its real registry URL.
    /// Returns the number of entries changed.
    pub fn restore_resolved(&mut self, npm: &NpmConfig) -> usize {
        let mut changed = 0;
        self.for_each_entry_mut(&mut |_, entry| {
            let Some(resolved) = entry.get("resolved").and_then(Value::as_str) else {
                return;
            };
            let version = entry.get("version").and_then(Value::as_str).unwrap_or("");
            let restored = resolve_registry_url(resolved, version, npm);
            if restored != resolved {
                entry.insert("resolved".to_string(), Value::String(restored));
                changed += 1;
            }
        });
        changed
    }

    /// Visit every dependency entry, nested entries before their parents.
    fn for_each_entry_mut(&mut self, visit: &mut dyn FnMut(&str, &mut Map<String, Value>)) {
        if let Some(deps) = self
            .content
            .get_mut("dependencies")
            .and_then(Value::as_object_mut)
        {
            visit_dependencies(deps, visit);
        }
        if let Some(packages) = self
            .content
            .get_mut("packages")
            .and_then(Value::as_object_mut)
        {
            for (key, entry) in packages.iter_mut() {
                let (Some(name), Some(entry)) = (package_name(key), entry.as_object_mut()) else {
                    continue;
                };
                if entry.get("link").and_then(Value::as_bool) == Some(true) {
                    continue;
                }
                visit(name, entry);
            }
        }
    }
}

fn visit_dependencies(
    deps: &mut Map<String, Value>,
    visit: &mut dyn FnMut(&str, &mut Map<String, Value>),
) {
    for (name, entry) in deps.iter_mut() {
        let Some(entry) = entry.as_object_mut() else {
            continue;
        };
        if let Some(children) = entry.get_mut("dependencies").and_then(Value::as_object_mut) {
            visit_dependencies(children, visit);
        }
        visit(name, entry);
    }
}

fn collect_names(deps: &Map<String, Value>, names: &mut BTreeSet<String>) {
    for (name, entry) in deps {
        names.insert(name.clone());
        if let Some(children) = entry.get("dependencies").and_then(Value::as_object) {
            collect_names(children, names);
        }
    }
}

/// Package name of a `packages` key such as `node_modules/a/node_modules/@s/b`.
fn package_name(key: &str) -> Option<&str> {
    key.rfind("node_modules/")
        .map(|i| &key[i + "node_modules/".len()..])
        .filter(|name| !name.is_empty())
}
