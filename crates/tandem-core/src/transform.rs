//! Content transforms applied when copying module files, and the copy itself.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::Result;

/// A content transform: the first one whose `matches` accepts the source
/// path rewrites the bytes written to the target.
#[derive(Clone, Copy)]
pub struct Transform {
    pub name: &'static str,
    pub matches: fn(&Path) -> bool,
    pub apply: fn(source: &Path, content: Vec<u8>) -> Result<Vec<u8>>,
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

/// Points `sourceRoot` of copied `.js.map` files back at the original
/// directory so debuggers find the sources.
pub const SOURCE_MAP: Transform = Transform {
    name: "source-map",
    matches: is_source_map,
    apply: rewrite_source_root,
};

/// The transforms used by quick-sync and the packager.
pub fn default_transforms() -> Vec<Transform> {
    vec![SOURCE_MAP]
}

fn is_source_map(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.ends_with(".js.map"))
}

fn rewrite_source_root(source: &Path, content: Vec<u8>) -> Result<Vec<u8>> {
    let mut map: serde_json::Value = serde_json::from_slice(&content)?;
    let Some(object) = map.as_object_mut() else {
        return Ok(content);
    };
    let root = source
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    object.insert("sourceRoot".to_string(), serde_json::Value::String(root));
    Ok(serde_json::to_vec(&map)?)
}

/// Copy `source` to `target` through the first matching transform.
///
/// The target is executable if the source is or if the file it replaces
/// was. Returns `Ok(false)` when the source vanished before it could be
/// read.
pub fn copy_file(source: &Path, target: &Path, transforms: &[Transform]) -> Result<bool> {
    let content = match std::fs::read(source) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("{} vanished before copy", source.display());
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    let content = match transforms.iter().find(|t| (t.matches)(source)) {
        Some(transform) => {
            tracing::debug!("applying {} to {}", transform.name, source.display());
            (transform.apply)(source, content)?
        }
        None => content,
    };

    let executable = is_executable(source) || is_executable(target);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, content)?;
    set_executable(target, executable)?;
    Ok(true)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    let mode = perms.mode();
    let mode = if executable {
        mode | ((mode & 0o444) >> 2)
    } else {
        mode & !0o111
    };
    perms.set_mode(mode);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_plain_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, "hello").unwrap();
        let target = dir.path().join("out/nested/a.txt");

        assert!(copy_file(&source, &target, &default_transforms()).unwrap());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
    }

    #[test]
    fn source_map_root_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lib/dist/index.js.map");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, r#"{"version":3,"sources":["../src/index.ts"]}"#).unwrap();
        let target = dir.path().join("app/index.js.map");

        copy_file(&source, &target, &default_transforms()).unwrap();
        let map: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&target).unwrap()).unwrap();
        assert_eq!(
            map["sourceRoot"],
            dir.path().join("lib/dist").to_string_lossy().as_ref()
        );
        assert_eq!(map["sources"][0], "../src/index.ts");
    }

    #[test]
    fn plain_js_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("index.js");
        std::fs::write(&source, "{\"sourceRoot\": 1}").unwrap();
        let target = dir.path().join("copy.js");
        copy_file(&source, &target, &default_transforms()).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\"sourceRoot\": 1}");
    }

    #[test]
    fn vanished_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let copied = copy_file(
            &dir.path().join("gone.js"),
            &dir.path().join("t.js"),
            &default_transforms(),
        )
        .unwrap();
        assert!(!copied);
        assert!(!dir.path().join("t.js").exists());
    }

    #[test]
    fn malformed_source_map_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("bad.js.map");
        std::fs::write(&source, "not json").unwrap();
        assert!(copy_file(&source, &dir.path().join("t.js.map"), &default_transforms()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_is_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("cli.js");
        std::fs::write(&source, "#!/usr/bin/env node").unwrap();
        std::fs::set_permissions(&source, std::fs::Permissions::from_mode(0o755)).unwrap();
        let target = dir.path().join("bin/cli.js");

        copy_file(&source, &target, &[]).unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_ne!(mode & 0o100, 0);

        // an executable target stays executable when the source is not
        let plain = dir.path().join("plain.js");
        std::fs::write(&plain, "1").unwrap();
        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o644)).unwrap();
        copy_file(&plain, &target, &[]).unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_ne!(mode & 0o100, 0);
    }
}
