//! `tandem dependency-tree`: the local dependency graph and sync order.

use anyhow::Result;
use tandem_core::graph::top_level;
use tandem_core::tree::{build_tree, format_order, format_tree};
use tandem_core::{walk_order, Workspace};

/// One tree per module nothing else depends on, then the order a full sync
/// would visit every module in.
pub fn render(workspace: &Workspace) -> Result<String> {
    let roots = top_level(workspace)?;
    let mut out = String::new();
    for root in &roots {
        out.push_str(&format_tree(&build_tree(workspace, root)?));
    }

    let all: Vec<_> = workspace.modules().collect();
    let order = walk_order(workspace, &all)?;
    if !order.is_empty() {
        out.push_str("\nSync order:\n");
        out.push_str(&format_order(&order));
    }
    Ok(out)
}
