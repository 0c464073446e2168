//! `tandem list-modules`: configured modules and where they live.

use tandem_core::Workspace;

/// One `name: path` line per module, sorted by name. Modules that are not
/// checked out yet are marked.
pub fn render(workspace: &Workspace) -> String {
    let mut out = String::new();
    for module in workspace.modules() {
        let missing = if module.path().exists() { "" } else { " (not cloned)" };
        out.push_str(&format!(
            "{}: {}{missing}\n",
            module.name(),
            module.path().display()
        ));
    }
    out
}
