//! Dependency tree display.
//!
//! ```text
//! @acme/app
//! ├── @acme/ui
//! │   └── @acme/core
//! └── @acme/core (shared)
//! ```

use std::collections::HashSet;

use crate::error::Result;
use crate::graph::{self, direct_deps};
use crate::module::Module;
use crate::workspace::Workspace;

/// A node of the local dependency tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub dependencies: Vec<TreeNode>,
    /// Already expanded elsewhere in the tree; children are omitted.
    pub shared: bool,
}

/// Build the tree below `root`. Fails on dependency cycles.
pub fn build_tree(workspace: &Workspace, root: &Module) -> Result<TreeNode> {
    // the walk rejects cycles, so the recursion below terminates
    graph::walk_order(workspace, &[root])?;
    let mut expanded = HashSet::new();
    build_node(workspace, root, &mut expanded)
}

fn build_node(
    workspace: &Workspace,
    module: &Module,
    expanded: &mut HashSet<String>,
) -> Result<TreeNode> {
    let name = module.name().full();
    if !expanded.insert(name.clone()) {
        return Ok(TreeNode {
            name,
            dependencies: Vec::new(),
            shared: true,
        });
    }
    let mut dependencies = Vec::new();
    for dep in direct_deps(workspace, module)? {
        dependencies.push(build_node(workspace, dep, expanded)?);
    }
    Ok(TreeNode {
        name,
        dependencies,
        shared: false,
    })
}

/// Format a dependency tree as a human-readable string.
pub fn format_tree(root: &TreeNode) -> String {
    let mut out = format!("{}\n", root.name);
    let count = root.dependencies.len();
    for (i, dep) in root.dependencies.iter().enumerate() {
        format_node(&mut out, dep, "", i == count - 1);
    }
    out
}

fn format_node(out: &mut String, node: &TreeNode, prefix: &str, is_last: bool) {
    let connector = if is_last { "└── " } else { "├── " };
    let shared_marker = if node.shared { " (shared)" } else { "" };
    out.push_str(&format!("{prefix}{connector}{}{shared_marker}\n", node.name));

    let child_prefix = if is_last {
        format!("{prefix}    ")
    } else {
        format!("{prefix}│   ")
    };
    let child_count = node.dependencies.len();
    for (i, child) in node.dependencies.iter().enumerate() {
        format_node(out, child, &child_prefix, i == child_count - 1);
    }
}

/// Format a numbered walk order.
pub fn format_order(order: &[&Module]) -> String {
    let width = order.len().to_string().len();
    order
        .iter()
        .enumerate()
        .map(|(i, m)| format!("{:>width$}. {}\n", i + 1, m.name()))
        .collect()
}
