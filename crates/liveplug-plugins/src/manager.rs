//! Live plugin manager
//!
//! Owns the loaded plugin instances and drives them through
//! setup, run and unload. Batch operations run every member on its own task
//! and always report one outcome per member.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::join_all;
use liveplug_kernel::plugin::{
    Binding, ContextId, Disposable, InstanceKey, Notification, Notifier, PluginError,
    PluginResult, PluginState, TracingNotifier,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::{CompiledCache, KeyedLocks};
use crate::config::LivePluginConfig;
use crate::descriptor::{LivePlugin, PluginRoots};
use crate::extension::ExtensionRegistry;
use crate::host::{HostPluginRegistry, InMemoryHostRegistry, SharedModuleResolver};
use crate::loader::runtime_module_resolver;
use crate::runner::{
    ExecutablePlugin, PluginRunner, RhaiRunner, RunnerServices, ScriptKind, find_runner,
};

/// Result for one member of a batch
#[derive(Debug, Clone)]
pub struct PluginOutcome {
    pub plugin_id: String,
    pub result: PluginResult<()>,
    pub duration: Duration,
}

impl PluginOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-member outcomes of a batch, in input order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<PluginOutcome>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// True if every member succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(PluginOutcome::is_success)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &PluginOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PluginOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn outcome(&self, plugin_id: &str) -> Option<&PluginOutcome> {
        self.outcomes.iter().find(|o| o.plugin_id == plugin_id)
    }
}

struct LoadedInstance {
    executable: ExecutablePlugin,
    disposable: Disposable,
}

/// Builder for [`LivePluginManager`]
pub struct LivePluginManagerBuilder {
    config: LivePluginConfig,
    host_registry: Option<Arc<dyn HostPluginRegistry>>,
    notifier: Arc<dyn Notifier>,
    runtime_loader: Option<SharedModuleResolver>,
    extensions: Option<Arc<ExtensionRegistry>>,
}

impl LivePluginManagerBuilder {
    pub fn new(config: LivePluginConfig) -> Self {
        Self {
            config,
            host_registry: None,
            notifier: Arc::new(TracingNotifier),
            runtime_loader: None,
            extensions: None,
        }
    }

    pub fn with_host_registry(mut self, registry: Arc<dyn HostPluginRegistry>) -> Self {
        self.host_registry = Some(registry);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_runtime_loader(mut self, loader: SharedModuleResolver) -> Self {
        self.runtime_loader = Some(loader);
        self
    }

    pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn build(self) -> Arc<LivePluginManager> {
        let host_registry = self
            .host_registry
            .unwrap_or_else(|| Arc::new(InMemoryHostRegistry::from_config(&self.config)));
        let config = Arc::new(self.config);
        let services = RunnerServices {
            cache: CompiledCache::new(config.compiled_dir.clone()),
            config: config.clone(),
            host_registry,
            extensions: self.extensions.unwrap_or_default(),
            notifier: self.notifier.clone(),
            runtime_loader: self.runtime_loader.unwrap_or_else(runtime_module_resolver),
        };

        let runners: Vec<Arc<dyn PluginRunner>> = vec![
            Arc::new(RhaiRunner::new(ScriptKind::Plugin, services.clone())),
            Arc::new(RhaiRunner::new(ScriptKind::Test, services.clone())),
        ];

        Arc::new(LivePluginManager {
            roots: config.roots(),
            config,
            runners,
            extensions: services.extensions,
            notifier: self.notifier,
            cache: services.cache,
            loaded: Mutex::new(HashMap::new()),
            states: Arc::new(DashMap::new()),
            locks: KeyedLocks::new(),
        })
    }
}

/// Loads, runs and unloads live plugins
pub struct LivePluginManager {
    config: Arc<LivePluginConfig>,
    roots: PluginRoots,
    runners: Vec<Arc<dyn PluginRunner>>,
    extensions: Arc<ExtensionRegistry>,
    notifier: Arc<dyn Notifier>,
    cache: CompiledCache,
    loaded: Mutex<HashMap<InstanceKey, LoadedInstance>>,
    states: Arc<DashMap<InstanceKey, PluginState>>,
    /// Serialises load, unload and cache deletion per plugin id
    locks: KeyedLocks,
}

impl LivePluginManager {
    pub fn builder(config: LivePluginConfig) -> LivePluginManagerBuilder {
        LivePluginManagerBuilder::new(config)
    }

    pub fn config(&self) -> &LivePluginConfig {
        &self.config
    }

    pub fn roots(&self) -> &PluginRoots {
        &self.roots
    }

    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    pub fn cache(&self) -> &CompiledCache {
        &self.cache
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// True if at least one plugin has an entry script some runner handles.
    pub fn can_be_handled(&self, plugins: &[LivePlugin]) -> bool {
        plugins
            .iter()
            .any(|plugin| find_runner(plugin, &self.runners).is_some())
    }

    pub fn is_loaded(&self, plugin: &LivePlugin, context: &ContextId) -> bool {
        self.loaded
            .lock()
            .contains_key(&plugin.instance_key(context))
    }

    pub fn state(&self, key: &InstanceKey) -> PluginState {
        self.states
            .get(key)
            .map(|state| *state)
            .unwrap_or(PluginState::Unloaded)
    }

    pub fn loaded_instances(&self) -> Vec<InstanceKey> {
        let mut keys: Vec<_> = self.loaded.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    // ------------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------------

    /// Loads (or reloads) every plugin in `plugins` into `context`.
    ///
    /// One member failing never affects the others; the report holds one
    /// outcome per member in input order.
    pub async fn run_plugins(
        self: &Arc<Self>,
        plugins: Vec<LivePlugin>,
        context: &ContextId,
        is_startup: bool,
    ) -> BatchReport {
        if !plugins.is_empty() && !self.can_be_handled(&plugins) {
            warn!("None of {} plugins has a known entry script", plugins.len());
        }
        self.batch(plugins, context, move |this, plugin, context| async move {
            this.run_plugin(plugin, context, is_startup).await
        })
        .await
    }

    /// Resolves and compiles every plugin without running anything.
    pub async fn check_plugins(
        self: &Arc<Self>,
        plugins: Vec<LivePlugin>,
        context: &ContextId,
    ) -> BatchReport {
        self.batch(plugins, context, |this, plugin, context| async move {
            this.check_plugin(plugin, context).await
        })
        .await
    }

    async fn batch<F, Fut>(
        self: &Arc<Self>,
        plugins: Vec<LivePlugin>,
        context: &ContextId,
        operation: F,
    ) -> BatchReport
    where
        F: Fn(Arc<Self>, LivePlugin, ContextId) -> Fut,
        Fut: Future<Output = PluginResult<()>> + Send + 'static,
    {
        let tasks = plugins.into_iter().map(|plugin| {
            let plugin_id = plugin.id().to_string();
            let started = Instant::now();
            let task = tokio::spawn(operation(Arc::clone(self), plugin, context.clone()));
            async move {
                let result = task.await.unwrap_or_else(|e| {
                    Err(PluginError::loading_with_cause(
                        format!("Plugin task for '{plugin_id}' failed"),
                        e,
                    ))
                });
                PluginOutcome {
                    plugin_id,
                    result,
                    duration: started.elapsed(),
                }
            }
        });

        BatchReport {
            outcomes: join_all(tasks).await,
        }
    }

    /// Unloads `plugins` from `context`, returning the instances that were
    /// actually loaded.
    pub async fn unload_plugins(
        &self,
        plugins: &[LivePlugin],
        context: &ContextId,
    ) -> Vec<InstanceKey> {
        let mut unloaded = Vec::new();
        for plugin in plugins {
            let key = plugin.instance_key(context);
            let _guard = self.locks.lock(plugin.id()).await;
            if self.unload_locked(&key) {
                unloaded.push(key);
            }
        }
        unloaded
    }

    /// Unloads `plugins` from every context they are loaded in.
    pub async fn unload_everywhere(&self, plugins: &[LivePlugin]) -> Vec<InstanceKey> {
        let mut unloaded = Vec::new();
        for plugin in plugins {
            let _guard = self.locks.lock(plugin.id()).await;
            let keys: Vec<InstanceKey> = self
                .loaded
                .lock()
                .keys()
                .filter(|key| key.plugin_id == plugin.id())
                .cloned()
                .collect();
            for key in keys {
                if self.unload_locked(&key) {
                    unloaded.push(key);
                }
            }
        }
        unloaded
    }

    /// Unloads whatever is still loaded in `context`, including instances
    /// whose plugin directory no longer exists.
    pub async fn unload_context(&self, context: &ContextId) -> Vec<InstanceKey> {
        let keys: Vec<InstanceKey> = self
            .loaded
            .lock()
            .keys()
            .filter(|key| key.context == *context)
            .cloned()
            .collect();

        let mut unloaded = Vec::new();
        for key in keys {
            let _guard = self.locks.lock(&key.plugin_id).await;
            if self.unload_locked(&key) {
                unloaded.push(key);
            }
        }
        unloaded
    }

    /// Deletes the compile output of `plugin_id`.
    pub async fn delete_compiled(&self, plugin_id: &str) -> bool {
        let _guard = self.locks.lock(plugin_id).await;
        match self.cache.remove(plugin_id) {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Couldn't delete compile output of '{}': {}", plugin_id, e);
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Single plugin
    // ------------------------------------------------------------------------

    /// Unloads any previous instance, then sets up and runs `plugin`.
    pub async fn run_plugin(
        &self,
        plugin: LivePlugin,
        context: ContextId,
        is_startup: bool,
    ) -> PluginResult<()> {
        let _guard = self.locks.lock(plugin.id()).await;
        let key = plugin.instance_key(&context);

        let Some(runner) = find_runner(&plugin, &self.runners).cloned() else {
            return Err(self.report(&key, self.no_runner_error(&plugin)));
        };

        self.unload_locked(&key);

        let executable = match self.setup(&runner, &plugin, &key).await {
            Ok(executable) => executable,
            Err(e) => {
                self.states.remove(&key);
                return Err(self.report(&key, e));
            }
        };

        self.states.insert(key.clone(), PluginState::Running);
        let disposable = Disposable::new(key.to_string());
        let binding = Binding::new(context, is_startup, plugin.path(), disposable.clone());

        let outcome = tokio::task::spawn_blocking(move || {
            let result = runner.run(&executable, &binding);
            (executable, result)
        })
        .await;

        let executable = match outcome {
            Ok((executable, Ok(()))) => executable,
            Ok((executable, Err(e))) => {
                self.roll_back(&key, &disposable, Some(&executable));
                return Err(self.report(&key, e));
            }
            Err(join_error) => {
                self.roll_back(&key, &disposable, None);
                return Err(self.report(&key, PluginError::running(join_error)));
            }
        };

        self.loaded.lock().insert(
            key.clone(),
            LoadedInstance {
                executable,
                disposable,
            },
        );
        self.states.insert(key.clone(), PluginState::Loaded);
        info!("Loaded live plugin {}", key);
        Ok(())
    }

    async fn check_plugin(&self, plugin: LivePlugin, context: ContextId) -> PluginResult<()> {
        let _guard = self.locks.lock(plugin.id()).await;
        let key = plugin.instance_key(&context);
        let Some(runner) = find_runner(&plugin, &self.runners).cloned() else {
            return Err(self.report(&key, self.no_runner_error(&plugin)));
        };

        // Checking never disturbs a loaded instance's state.
        let probe = Arc::new(DashMap::new());
        let result = self.setup_with(&runner, &plugin, &key, probe).await;
        result
            .map(|executable| debug!("{} compiled from {}", key, executable.entry.display()))
            .map_err(|e| self.report(&key, e))
    }

    async fn setup(
        &self,
        runner: &Arc<dyn PluginRunner>,
        plugin: &LivePlugin,
        key: &InstanceKey,
    ) -> PluginResult<ExecutablePlugin> {
        self.setup_with(runner, plugin, key, self.states.clone())
            .await
    }

    async fn setup_with(
        &self,
        runner: &Arc<dyn PluginRunner>,
        plugin: &LivePlugin,
        key: &InstanceKey,
        states: Arc<DashMap<InstanceKey, PluginState>>,
    ) -> PluginResult<ExecutablePlugin> {
        let runner = runner.clone();
        let plugin = plugin.clone();
        let key = key.clone();
        let context = key.context.clone();

        tokio::task::spawn_blocking(move || {
            runner.setup(&plugin, &context, &|state| {
                debug!("{} -> {}", key, state);
                states.insert(key.clone(), state);
            })
        })
        .await
        .unwrap_or_else(|e| Err(PluginError::loading_with_cause("Plugin setup failed", e)))
    }

    /// Disposes the instance under `key`. Caller holds the id lock.
    fn unload_locked(&self, key: &InstanceKey) -> bool {
        let Some(instance) = self.loaded.lock().remove(key) else {
            debug!("{} is not loaded, nothing to unload", key);
            return false;
        };

        self.states.insert(key.clone(), PluginState::Unloading);
        instance.disposable.dispose();
        instance.executable.unbind();
        let leftovers = self.extensions.unregister_owner(key);
        if leftovers > 0 {
            warn!("{} left {} registrations behind after disposal", key, leftovers);
        }
        self.states.remove(key);
        info!("Unloaded live plugin {}", key);
        true
    }

    fn roll_back(
        &self,
        key: &InstanceKey,
        disposable: &Disposable,
        executable: Option<&ExecutablePlugin>,
    ) {
        disposable.dispose();
        if let Some(executable) = executable {
            executable.unbind();
        }
        self.extensions.unregister_owner(key);
        self.states.remove(key);
    }

    fn no_runner_error(&self, plugin: &LivePlugin) -> PluginError {
        let names: Vec<&str> = self.runners.iter().map(|r| r.script_name()).collect();
        PluginError::loading(format!(
            "Plugin '{}' has no entry script ({}).",
            plugin.id(),
            names.join(" or ")
        ))
    }

    fn report(&self, key: &InstanceKey, err: PluginError) -> PluginError {
        let title = match &err {
            PluginError::LoadingError { .. } => "Error loading plugin",
            PluginError::RunningError { .. } => "Error running plugin",
        };
        error!("{} '{}': {}", title, key, err);
        self.notifier.notify(Notification::error(
            Some(&key.plugin_id),
            title,
            &err.to_string(),
        ));
        err
    }
}
