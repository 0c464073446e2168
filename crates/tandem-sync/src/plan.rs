//! Deciding which modules a sync run touches, in what order, and which of
//! them must be packed.

use std::collections::HashSet;
use std::fmt;

use tandem_core::graph::transitive_deps;
use tandem_core::{walk_order, Module, Workspace};

use crate::error::Result;

/// One module of a sync run.
#[derive(Debug, Clone, Copy)]
pub struct SyncStep<'a> {
    pub module: &'a Module,
    /// A dependant pins its dependencies with a lockfile, so the tarball
    /// integrity of this module must be known before the dependant runs.
    pub should_package: bool,
}

/// The modules of a sync run, dependencies before dependants.
#[derive(Debug, Clone)]
pub struct SyncPlan<'a> {
    steps: Vec<SyncStep<'a>>,
}

impl<'a> SyncPlan<'a> {
    /// Plan a run over `roots` and everything they depend on locally.
    pub fn new(workspace: &'a Workspace, roots: &[&'a Module]) -> Result<Self> {
        let order = walk_order(workspace, roots)?;

        let mut package = HashSet::new();
        for module in order.iter().copied().filter(|m| m.has_lockfile()) {
            for dep in transitive_deps(workspace, module)? {
                package.insert(dep.name().full());
            }
        }

        let steps = order
            .into_iter()
            .map(|module| SyncStep {
                module,
                should_package: package.contains(&module.name().full()),
            })
            .collect();
        Ok(SyncPlan { steps })
    }

    pub fn steps(&self) -> &[SyncStep<'a>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for SyncPlan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            write!(f, "{}. {}", i + 1, step.module.name())?;
            if step.should_package {
                write!(f, " (packed)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
