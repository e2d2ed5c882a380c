//! Per-context runtime state

use std::path::{Path, PathBuf};
use std::time::Instant;

use liveplug_kernel::plugin::ContextId;

/// A process or project as the host describes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    pub id: ContextId,
    /// Project-local plugins only run in trusted projects.
    pub trusted: bool,
}

impl HostContext {
    pub fn process() -> Self {
        Self {
            id: ContextId::Process,
            trusted: true,
        }
    }

    pub fn project(base_path: impl Into<PathBuf>, trusted: bool) -> Self {
        Self {
            id: ContextId::project(base_path),
            trusted,
        }
    }

    pub fn base_path(&self) -> Option<&Path> {
        self.id.project_path()
    }
}

/// What the runtime remembers about an open context
#[derive(Debug)]
pub struct ContextState {
    pub context: HostContext,
    /// Root the bundled plugins were loaded from
    pub bundled_root: PathBuf,
    /// `<project>/.spp/plugins`, absent for the process context
    pub project_root: Option<PathBuf>,
    pub opened_at: Instant,
}

impl ContextState {
    pub fn new(context: HostContext, bundled_root: PathBuf, project_root: Option<PathBuf>) -> Self {
        Self {
            context,
            bundled_root,
            project_root,
            opened_at: Instant::now(),
        }
    }

    /// Project root to load from, if the context is trusted.
    pub fn loadable_project_root(&self) -> Option<&Path> {
        self.project_root
            .as_deref()
            .filter(|_| self.context.trusted)
    }
}
