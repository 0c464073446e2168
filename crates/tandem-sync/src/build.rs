//! Running a module's build commands when its build inputs changed.

use tandem_core::{Module, PackageManifest, Process, Subset};

use crate::context::SyncContext;
use crate::error::Result;

/// Run the build commands of `module` if its build subset changed since the
/// last recorded build. Returns whether a build ran.
pub async fn build_if_changed(ctx: &SyncContext, module: &Module) -> Result<bool> {
    if module.build_commands().is_empty() {
        return Ok(false);
    }
    if !ctx.state().has_changed(module, Subset::Build)? {
        tracing::debug!("{} is up to date", module.name());
        return Ok(false);
    }
    tracing::info!("building {}", module.name());
    run_build_commands(ctx, module).await?;
    ctx.state().save_actual(module, Subset::Build)?;
    Ok(true)
}

/// Run every build command in order. A command naming an npm script of the
/// module runs as `npm run <script>`, anything else goes to the shell.
pub async fn run_build_commands(ctx: &SyncContext, module: &Module) -> Result<()> {
    let manifest = PackageManifest::load_optional(module.path())?;
    for command in module.build_commands() {
        let is_script = manifest.as_ref().is_some_and(|m| m.has_script(command));
        let process = if is_script {
            ctx.npm(["run", command.as_str()])
        } else {
            Process::shell(command)
        };
        process.current_dir(module.path()).run().await?;
    }
    Ok(())
}
