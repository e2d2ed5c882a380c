//! Rhai runners for `plugin.rhai` and `plugin-test.rhai`

use std::sync::Arc;

use liveplug_extra::rhai::{build_engine, compile_file};
use liveplug_kernel::plugin::{
    Binding, ContextId, Notification, Notifier, PluginError, PluginResult, PluginState,
};
use rhai::{CallFnOptions, Dynamic, Scope};
use tracing::{debug, info, warn};

use super::api::{BindingSlot, RunScope, install_plugin_api};
use super::{ExecutablePlugin, PluginRunner};
use crate::cache::CompiledCache;
use crate::config::LivePluginConfig;
use crate::descriptor::LivePlugin;
use crate::extension::{ExtensionRegistry, ScriptUnit};
use crate::host::{HostPluginRegistry, SharedModuleResolver};
use crate::loader::create_class_loader;
use crate::resolver::{resolve_classpath, system_environment};

/// Entry script of regular plugins
pub const PLUGIN_SCRIPT: &str = "plugin.rhai";
/// Entry script of test plugins
pub const TEST_SCRIPT: &str = "plugin-test.rhai";

/// Kind of entry script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Evaluates the script's top level.
    Plugin,
    /// Evaluates the top level, then every zero-argument `test*` function.
    Test,
}

impl ScriptKind {
    pub fn script_name(&self) -> &'static str {
        match self {
            ScriptKind::Plugin => PLUGIN_SCRIPT,
            ScriptKind::Test => TEST_SCRIPT,
        }
    }
}

/// Collaborators every runner needs
#[derive(Clone)]
pub struct RunnerServices {
    pub config: Arc<LivePluginConfig>,
    pub host_registry: Arc<dyn HostPluginRegistry>,
    pub extensions: Arc<ExtensionRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub runtime_loader: SharedModuleResolver,
    pub cache: CompiledCache,
}

/// Runner for Rhai entry scripts
pub struct RhaiRunner {
    kind: ScriptKind,
    services: RunnerServices,
}

impl RhaiRunner {
    pub fn new(kind: ScriptKind, services: RunnerServices) -> Self {
        Self { kind, services }
    }

    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    fn script_scope(plugin: &LivePlugin, binding: &Binding) -> Scope<'static> {
        let project_path = binding
            .context
            .project_path()
            .map(|path| Dynamic::from(path.display().to_string()))
            .unwrap_or(Dynamic::UNIT);

        let mut scope = Scope::new();
        scope.push_constant("PLUGIN_ID", plugin.id().to_string());
        scope.push_constant("PLUGIN_PATH", binding.plugin_path.display().to_string());
        scope.push_constant("IS_STARTUP", binding.is_startup);
        scope.push_constant_dynamic("PROJECT_PATH", project_path);
        scope
    }

    fn run_tests(&self, unit: &ScriptUnit, scope: &mut Scope) -> PluginResult<()> {
        let mut names: Vec<String> = unit
            .ast
            .iter_functions()
            .filter(|f| f.name.starts_with("test") && f.params.is_empty())
            .map(|f| f.name.to_string())
            .collect();
        names.sort();

        let mut failures = Vec::new();
        for name in &names {
            debug!("[{}] running {}", unit.plugin_id, name);
            // The top level already ran; only call the function itself.
            let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
            if let Err(err) =
                unit.engine
                    .call_fn_with_options::<Dynamic>(options, scope, &unit.ast, name, ())
            {
                failures.push(format!("{name}: {err}"));
            }
        }

        if !failures.is_empty() {
            return Err(PluginError::running_message(format!(
                "{} of {} tests failed:\n{}",
                failures.len(),
                names.len(),
                failures.join("\n")
            )));
        }

        self.services.notifier.notify(Notification::info(
            Some(&unit.plugin_id),
            "Tests passed",
            &format!("All {} tests passed", names.len()),
        ));
        Ok(())
    }
}

impl PluginRunner for RhaiRunner {
    fn script_name(&self) -> &str {
        self.kind.script_name()
    }

    fn setup(
        &self,
        plugin: &LivePlugin,
        context: &ContextId,
        on_state: &dyn Fn(PluginState),
    ) -> PluginResult<ExecutablePlugin> {
        let services = &self.services;
        on_state(PluginState::Resolving);

        let entry = plugin.entry_script(self.script_name()).ok_or_else(|| {
            PluginError::loading(format!(
                "Plugin '{}' has no '{}' script.",
                plugin.id(),
                self.script_name()
            ))
        })?;
        let source = std::fs::read_to_string(&entry).map_err(|e| {
            PluginError::loading_with_cause(format!("Couldn't read '{}'.", entry.display()), e)
        })?;
        let lines: Vec<&str> = source.lines().collect();

        let resolved = resolve_classpath(
            &lines,
            &system_environment(),
            services.host_registry.as_ref(),
            &services.config,
        )?;

        let mut classpath = vec![plugin.path().to_path_buf()];
        classpath.extend(
            resolved
                .additional
                .iter()
                .filter(|entry| entry.as_path() != plugin.path())
                .cloned(),
        );
        let loader = create_class_loader(
            &classpath,
            &resolved.transitive,
            &format!("LivePlugin: {}", plugin.id()),
            &services.runtime_loader,
        )?;
        on_state(PluginState::ClassLoaded);

        let slot = BindingSlot::default();
        let mut engine = build_engine(&services.config.engine, plugin.id());
        install_plugin_api(&mut engine, &slot, services.notifier.clone());
        engine.set_module_resolver(loader);

        let compiled = compile_file(&engine, &entry).map_err(|e| {
            PluginError::loading_with_cause(
                format!("Error compiling script '{}'.", entry.display()),
                e,
            )
        })?;
        if let Err(e) = services.cache.store(plugin.id(), &compiled, &classpath) {
            warn!("Couldn't write compile output of '{}': {}", plugin.id(), e);
        }
        on_state(PluginState::Compiled);

        let unit = Arc::new(ScriptUnit {
            plugin_id: plugin.id().to_string(),
            engine,
            ast: compiled.ast,
        });
        Ok(ExecutablePlugin::new(
            plugin.clone(),
            context.clone(),
            entry,
            classpath,
            resolved.dependency_ids,
            unit,
            slot,
        ))
    }

    fn run(&self, executable: &ExecutablePlugin, binding: &Binding) -> PluginResult<()> {
        let plugin = &executable.plugin;
        executable.slot().bind(RunScope {
            owner: plugin.instance_key(&binding.context),
            disposable: binding.disposable.clone(),
            registry: Arc::downgrade(&self.services.extensions),
            unit: Arc::downgrade(&executable.unit),
        });

        let unit = &executable.unit;
        let mut scope = Self::script_scope(plugin, binding);
        unit.engine
            .run_ast_with_scope(&mut scope, &unit.ast)
            .map_err(|err| PluginError::running(*err))?;

        if self.kind == ScriptKind::Test {
            self.run_tests(unit, &mut scope)?;
        }

        info!(
            "Ran {} '{}' in {}",
            self.script_name(),
            plugin.id(),
            binding.context
        );
        Ok(())
    }
}
