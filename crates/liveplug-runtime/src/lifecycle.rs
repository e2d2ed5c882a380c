//! Lifecycle hooks
//!
//! The host calls [`LivePluginRuntime::on_opened`] when a process or project
//! context becomes available, [`LivePluginRuntime::on_closing`] before it
//! goes away and [`LivePluginRuntime::on_file_deleted`] for every removed
//! path. Everything per-plugin is delegated to the [`LivePluginManager`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use liveplug_kernel::plugin::{ContextId, InstanceKey};
use liveplug_plugins::{
    BatchReport, LivePlugin, LivePluginManager, PluginRootWatcher, WatchConfig,
};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::RuntimeResult;
use crate::resources::BundledResources;
use crate::state::{ContextState, HostContext};
use crate::status::StatusService;

/// Results of loading one context
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub context: Option<ContextId>,
    pub bundled: BatchReport,
    /// Absent when the context has no project root or is not trusted
    pub project: Option<BatchReport>,
}

impl LoadSummary {
    pub fn is_success(&self) -> bool {
        self.bundled.is_success() && self.project.as_ref().is_none_or(BatchReport::is_success)
    }

    pub fn loaded(&self) -> usize {
        self.bundled.succeeded().count()
            + self.project.as_ref().map_or(0, |p| p.succeeded().count())
    }

    pub fn failed(&self) -> usize {
        self.bundled.failed().count() + self.project.as_ref().map_or(0, |p| p.failed().count())
    }
}

/// Host-facing entry point of the runtime
pub struct LivePluginRuntime {
    manager: Arc<LivePluginManager>,
    states: DashMap<ContextId, Arc<ContextState>>,
    resources: OnceCell<Arc<BundledResources>>,
    status: StatusService,
}

impl LivePluginRuntime {
    pub fn new(manager: Arc<LivePluginManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            states: DashMap::new(),
            resources: OnceCell::new(),
            status: StatusService::new(),
        })
    }

    pub fn manager(&self) -> &Arc<LivePluginManager> {
        &self.manager
    }

    pub fn status(&self) -> &StatusService {
        &self.status
    }

    pub fn state(&self, context: &ContextId) -> Option<Arc<ContextState>> {
        self.states.get(context).map(|state| state.clone())
    }

    pub fn open_contexts(&self) -> Vec<ContextId> {
        let mut contexts: Vec<_> = self.states.iter().map(|e| e.key().clone()).collect();
        contexts.sort();
        contexts
    }

    /// Bundled plugins, extracted on first use.
    pub async fn bundled_resources(&self) -> RuntimeResult<Arc<BundledResources>> {
        let subpath = self.manager.config().project_plugins_subpath.clone();
        let resources = self
            .resources
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || BundledResources::extract(&subpath))
                    .await
                    .map_err(std::io::Error::other)?
                    .map(Arc::new)
            })
            .await?;
        Ok(resources.clone())
    }

    // ------------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------------

    /// Starts loading the plugins of a newly opened context.
    ///
    /// Returns `None` if the context is already open. The handle resolves
    /// after every plugin of both batches has settled.
    pub async fn on_opened(
        self: &Arc<Self>,
        context: HostContext,
    ) -> RuntimeResult<Option<JoinHandle<LoadSummary>>> {
        if self.states.contains_key(&context.id) {
            debug!("Context {} is already open", context.id);
            return Ok(None);
        }

        let resources = self.bundled_resources().await?;
        let project_root = context
            .base_path()
            .map(|base| self.manager.config().project_plugins_dir(base));
        let state = Arc::new(ContextState::new(
            context.clone(),
            resources.plugins_root().to_path_buf(),
            project_root,
        ));

        match self.states.entry(context.id.clone()) {
            Entry::Occupied(_) => {
                debug!("Context {} was opened concurrently", context.id);
                return Ok(None);
            }
            Entry::Vacant(entry) => {
                entry.insert(state.clone());
            }
        }
        if !context.trusted {
            info!("Project {} is not trusted, skipping its plugins", context.id);
        }

        let this = Arc::clone(self);
        Ok(Some(tokio::spawn(async move { this.load_context(state).await })))
    }

    async fn load_context(self: Arc<Self>, state: Arc<ContextState>) -> LoadSummary {
        let context = state.context.id.clone();
        let roots = self.manager.roots();
        let bundled = sorted(roots.discover(&state.bundled_root));
        let project = state.loadable_project_root().map(|root| sorted(roots.discover(root)));

        let (bundled, project) = tokio::join!(
            self.manager.run_plugins(bundled, &context, true),
            async {
                match project {
                    Some(plugins) => Some(self.manager.run_plugins(plugins, &context, true).await),
                    None => None,
                }
            }
        );

        let summary = LoadSummary {
            context: Some(context),
            bundled,
            project,
        };
        info!(
            "Loaded {} live plugins ({} failed)",
            summary.loaded(),
            summary.failed()
        );
        if self.status.mark_loaded() {
            info!("Live plugins are ready");
        }
        summary
    }

    /// Loads the plugins of the global root into the process context.
    pub fn on_process_started(self: &Arc<Self>) -> JoinHandle<BatchReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let root = this.manager.roots().global_root().to_path_buf();
            let plugins = sorted(this.manager.roots().discover(&root));
            this.manager
                .run_plugins(plugins, &ContextId::Process, true)
                .await
        })
    }

    /// Unloads the bundled plugins, then the project plugins, of `context` and
    /// forgets it. Instances whose directory moved away since loading are
    /// unloaded last.
    pub async fn on_closing(&self, context: &ContextId) -> Vec<InstanceKey> {
        let Some(state) = self.state(context) else {
            debug!("Context {} is not open", context);
            return Vec::new();
        };

        let roots = self.manager.roots();
        let mut unloaded = self
            .manager
            .unload_plugins(&roots.discover(&state.bundled_root), context)
            .await;
        if let Some(project_root) = &state.project_root {
            unloaded.extend(
                self.manager
                    .unload_plugins(&roots.discover(project_root), context)
                    .await,
            );
        }
        let stale = self.manager.unload_context(context).await;
        if !stale.is_empty() {
            debug!("Unloaded {} plugins missing from the roots of {}", stale.len(), context);
        }
        unloaded.extend(stale);

        self.states.remove(context);
        info!("Closed {} ({} plugins unloaded)", context, unloaded.len());
        unloaded
    }

    /// Unloads a deleted plugin everywhere and removes its compile output.
    ///
    /// Returns `None` if `path` is not a plugin root.
    pub fn on_file_deleted(self: &Arc<Self>, path: &Path) -> Option<JoinHandle<Vec<InstanceKey>>> {
        if !self.manager.roots().is_plugin_root(path) {
            return None;
        }

        let plugin = LivePlugin::new(path);
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let unloaded = this
                .manager
                .unload_everywhere(std::slice::from_ref(&plugin))
                .await;
            if this.manager.delete_compiled(plugin.id()).await {
                debug!("Deleted compile output of '{}'", plugin.id());
            }
            info!("Plugin '{}' was deleted", plugin.id());
            unloaded
        }))
    }

    /// Watches the global root and `extra_roots` and feeds removals into
    /// [`Self::on_file_deleted`]. Keep the returned watcher alive.
    pub fn watch_deletions(
        self: &Arc<Self>,
        extra_roots: &[PathBuf],
        config: WatchConfig,
    ) -> RuntimeResult<PluginRootWatcher> {
        let roots = self.manager.roots();
        let mut watcher = PluginRootWatcher::new(roots.clone(), config);
        watcher.watch(roots.global_root())?;
        for root in extra_roots {
            watcher.watch(root)?;
        }

        let Some(mut removals) = watcher.take_event_receiver() else {
            warn!("Deletion watcher has no event receiver");
            return Ok(watcher);
        };
        watcher.start()?;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(path) = removals.recv().await {
                if let Some(handle) = this.on_file_deleted(&path) {
                    let _ = handle.await;
                }
            }
        });
        Ok(watcher)
    }
}

fn sorted(mut plugins: Vec<LivePlugin>) -> Vec<LivePlugin> {
    plugins.sort_by(|a, b| a.id().cmp(b.id()));
    plugins
}
