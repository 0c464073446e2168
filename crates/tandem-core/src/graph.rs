//! Dependency graph over local modules.
//!
//! Edges are read from each module's `package.json` on every call; nothing
//! is cached because manifests change between traversals. Dependencies that
//! are not local modules are dropped since npm fetches those from the
//! upstream registry.

use std::collections::HashSet;

use crate::error::{CoreError, Result};
use crate::manifest::PackageManifest;
use crate::module::Module;
use crate::workspace::Workspace;

/// What a [`walk`] visitor wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    Continue,
    Stop,
}

/// Local modules that `module` declares as dependencies.
///
/// A module without a `package.json` (not fetched yet) has none.
pub fn direct_deps<'a>(workspace: &'a Workspace, module: &Module) -> Result<Vec<&'a Module>> {
    let Some(manifest) = PackageManifest::load_optional(module.path())? else {
        return Ok(Vec::new());
    };
    Ok(manifest
        .dependency_names(workspace.include_dev())
        .into_iter()
        .filter_map(|name| workspace.module(name))
        .collect())
}

struct Frame<'a> {
    module: &'a Module,
    deps: Vec<&'a Module>,
    next: usize,
}

/// Visit `roots` and their local dependencies, every dependency before its
/// dependents and every module at most once.
///
/// A dependency that is already an ancestor on the current path is a
/// [`CoreError::DependencyCycle`]; the visitor is not called for any module
/// of the cycle. The visitor may return [`WalkAction::Stop`] to end the walk.
pub fn walk<'a, F>(workspace: &'a Workspace, roots: &[&'a Module], mut visitor: F) -> Result<()>
where
    F: FnMut(&'a Module) -> Result<WalkAction>,
{
    let mut visited: HashSet<String> = HashSet::new();

    for &root in roots {
        if visited.contains(&root.name().full()) {
            continue;
        }
        let mut stack = vec![Frame {
            module: root,
            deps: direct_deps(workspace, root)?,
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next < frame.deps.len() {
                let dep = frame.deps[frame.next];
                frame.next += 1;

                let dep_name = dep.name().full();
                if stack.iter().any(|f| f.module.name() == dep.name()) {
                    return Err(CoreError::DependencyCycle {
                        dependency: dep_name,
                        path: stack.iter().map(|f| f.module.name().full()).collect(),
                    });
                }
                if visited.contains(&dep_name) {
                    continue;
                }
                stack.push(Frame {
                    module: dep,
                    deps: direct_deps(workspace, dep)?,
                    next: 0,
                });
                continue;
            }

            let module = frame.module;
            stack.pop();
            visited.insert(module.name().full());
            if visitor(module)? == WalkAction::Stop {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// All modules reachable from `roots`, in walk order.
pub fn walk_order<'a>(workspace: &'a Workspace, roots: &[&'a Module]) -> Result<Vec<&'a Module>> {
    let mut order = Vec::new();
    walk(workspace, roots, |module| {
        order.push(module);
        Ok(WalkAction::Continue)
    })?;
    Ok(order)
}

/// Local modules `root` depends on, directly or transitively, in walk order.
pub fn transitive_deps<'a>(workspace: &'a Workspace, root: &'a Module) -> Result<Vec<&'a Module>> {
    let mut order = walk_order(workspace, &[root])?;
    order.retain(|m| m.name() != root.name());
    Ok(order)
}

/// Modules no other local module depends on.
pub fn top_level<'a>(workspace: &'a Workspace) -> Result<Vec<&'a Module>> {
    let mut depended_on = HashSet::new();
    for module in workspace.modules() {
        for dep in direct_deps(workspace, module)? {
            depended_on.insert(dep.name().full());
        }
    }
    Ok(workspace
        .modules()
        .filter(|m| !depended_on.contains(&m.name().full()))
        .collect())
}
