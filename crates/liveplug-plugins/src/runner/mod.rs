//! Plugin runners
//!
//! A runner turns a plugin directory into something runnable in two steps:
//! `setup` resolves, builds the module loader and compiles; `run` executes the
//! compiled script against an instance binding. Which runner handles a plugin
//! is decided by the name of the entry script found in its directory.

use std::path::PathBuf;
use std::sync::Arc;

use liveplug_kernel::plugin::{Binding, ContextId, PluginResult, PluginState};

use crate::descriptor::LivePlugin;
use crate::extension::ScriptUnit;

pub mod api;
mod script;

pub use self::api::{BindingSlot, RunScope, install_plugin_api};
pub use self::script::{PLUGIN_SCRIPT, RhaiRunner, RunnerServices, ScriptKind, TEST_SCRIPT};

/// Output of a successful setup, ready to run
#[derive(Debug)]
pub struct ExecutablePlugin {
    pub plugin: LivePlugin,
    pub context: ContextId,
    /// Entry script that was compiled
    pub entry: PathBuf,
    /// Own classpath: plugin root followed by classpath additions
    pub classpath: Vec<PathBuf>,
    /// Declared host plugin dependencies
    pub dependency_ids: Vec<String>,
    pub unit: Arc<ScriptUnit>,
    slot: BindingSlot,
}

impl ExecutablePlugin {
    pub(crate) fn new(
        plugin: LivePlugin,
        context: ContextId,
        entry: PathBuf,
        classpath: Vec<PathBuf>,
        dependency_ids: Vec<String>,
        unit: Arc<ScriptUnit>,
        slot: BindingSlot,
    ) -> Self {
        Self {
            plugin,
            context,
            entry,
            classpath,
            dependency_ids,
            unit,
            slot,
        }
    }

    pub fn slot(&self) -> &BindingSlot {
        &self.slot
    }

    /// Detaches the instance scope from the engine; later API calls fail.
    pub fn unbind(&self) {
        self.slot.unbind();
    }
}

/// Strategy for one kind of entry script
pub trait PluginRunner: Send + Sync {
    /// File name of the entry script this runner handles.
    fn script_name(&self) -> &str;

    /// Resolves, builds the module loader and compiles.
    ///
    /// `on_state` is told about each completed phase. Failures are
    /// [`PluginError::LoadingError`](liveplug_kernel::plugin::PluginError)s and
    /// leave nothing behind.
    fn setup(
        &self,
        plugin: &LivePlugin,
        context: &ContextId,
        on_state: &dyn Fn(PluginState),
    ) -> PluginResult<ExecutablePlugin>;

    /// Executes `executable` with `binding`; script failures are
    /// [`PluginError::RunningError`](liveplug_kernel::plugin::PluginError)s.
    fn run(&self, executable: &ExecutablePlugin, binding: &Binding) -> PluginResult<()>;
}

/// First runner whose entry script exists in `plugin`.
pub fn find_runner<'a>(
    plugin: &LivePlugin,
    runners: &'a [Arc<dyn PluginRunner>],
) -> Option<&'a Arc<dyn PluginRunner>> {
    let files = plugin.all_files();
    runners.iter().find(|runner| {
        files
            .iter()
            .any(|file| file.file_name().is_some_and(|n| n == runner.script_name()))
    })
}
