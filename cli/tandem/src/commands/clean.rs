//! `tandem clean`: remove cached tarballs and saved module state.

use std::fs;
use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;

use super::App;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CleanTarget {
    /// Downloaded tarballs
    Cache,
    /// Saved file state of every module
    State,
    /// Cache, state and packing directories
    All,
}

pub fn run(app: &App, target: CleanTarget) -> Result<()> {
    let dirs = app.workspace().dirs();
    if matches!(target, CleanTarget::Cache | CleanTarget::All) {
        remove(&dirs.cache)?;
    }
    if matches!(target, CleanTarget::State | CleanTarget::All) {
        remove(&dirs.state)?;
    }
    if target == CleanTarget::All {
        let temp = app.context().packager().temp_root();
        remove(temp)?;
    }
    Ok(())
}

fn remove(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
        println!("Removed {}", dir.display());
    } else {
        println!("Already clean: {} does not exist", dir.display());
    }
    Ok(())
}
