//! Named file subsets of a module.

use std::fmt;
use std::path::Path;

use crate::files::has_incidental_component;
use crate::module::Module;

/// Ignore files at the module root that are never published themselves.
const IGNORE_FILE_NAMES: &[&str] = &[".gitignore", ".npmignore"];

/// A named predicate over a module's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subset {
    /// Files whose change requires running the build commands.
    Build,
    /// Files that end up in the package tarball.
    Publish,
}

impl Subset {
    /// Tag under which state for this subset is persisted.
    pub fn tag(self) -> &'static str {
        match self {
            Subset::Build => "build",
            Subset::Publish => "publish",
        }
    }

    /// Whether `relative` (a path relative to the module root) belongs to
    /// this subset of `module`.
    pub fn includes(self, module: &Module, relative: &Path, is_dir: bool) -> bool {
        match self {
            Subset::Build => module.matches_build_trigger(relative),
            Subset::Publish => {
                let is_ignore_file = IGNORE_FILE_NAMES
                    .iter()
                    .any(|name| relative == Path::new(name));
                !is_ignore_file
                    && !has_incidental_component(relative)
                    && !module.is_ignored(relative, is_dir)
            }
        }
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
