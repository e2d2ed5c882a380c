//! liveplug plugins
//!
//! Discovers live plugins on disk, resolves their classpath and host plugin
//! dependencies, builds a module resolver scoped to each plugin, compiles and
//! runs their Rhai entry scripts, and tears down everything they registered on
//! unload.
//!
//! ```text
//! LivePlugin ──► resolver ──► loader ──► runner.setup ──► runner.run ──► Loaded
//!                                                                          │
//!                                   Disposable::dispose ◄── unload ◄───────┘
//! ```

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod extension;
pub mod host;
pub mod hot_reload;
pub mod loader;
pub mod manager;
pub mod resolver;
pub mod runner;

pub use cache::{CompileManifest, CompiledCache, KeyedLocks};
pub use config::{HostPluginSpec, LivePluginConfig};
pub use descriptor::{LivePlugin, PluginRoots};
pub use extension::{Extension, ExtensionInfo, ExtensionKind, ExtensionRegistry, InvokeError};
pub use host::{
    HostDependency, HostPluginDescriptor, HostPluginRegistry, InMemoryHostRegistry,
    SharedModuleResolver,
};
pub use hot_reload::{PluginRootWatcher, WatchConfig};
pub use loader::{PluginClassLoader, create_class_loader, runtime_module_resolver};
pub use manager::{BatchReport, LivePluginManager, LivePluginManagerBuilder, PluginOutcome};
pub use resolver::{ResolvedClasspath, resolve_classpath, system_environment};
pub use runner::{
    ExecutablePlugin, PLUGIN_SCRIPT, PluginRunner, RhaiRunner, ScriptKind, TEST_SCRIPT,
};

pub use liveplug_kernel::plugin::{
    Binding, ContextId, Disposable, InstanceKey, Notification, Notifier, PluginError,
    PluginResult, PluginState,
};
