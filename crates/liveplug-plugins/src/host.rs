//! Host plugin registry
//!
//! Host plugins are the long-lived plugins installed in the host application.
//! Live plugins depend on them with `// depends-on-plugin <id>` and can then
//! import the modules their loader exports.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use rhai::module_resolvers::FileModuleResolver;

use crate::config::{HostPluginSpec, LivePluginConfig};

/// Shareable Rhai module resolver
pub type SharedModuleResolver = Arc<dyn rhai::ModuleResolver>;

/// Dependency edge between host plugins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDependency {
    pub id: String,
    pub optional: bool,
}

/// Descriptor of an installed host plugin
#[derive(Clone)]
pub struct HostPluginDescriptor {
    pub id: String,
    pub dependencies: Vec<HostDependency>,
    /// Resolver for the modules this plugin exports, if it exports any
    pub loader: Option<SharedModuleResolver>,
}

impl HostPluginDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            loader: None,
        }
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(HostDependency {
            id: id.into(),
            optional: false,
        });
        self
    }

    pub fn with_optional_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(HostDependency {
            id: id.into(),
            optional: true,
        });
        self
    }

    pub fn with_loader(mut self, loader: SharedModuleResolver) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Host plugin exporting the `.rhai` files of `dir` as modules.
    pub fn with_modules_dir(self, dir: impl Into<PathBuf>) -> Self {
        let resolver = FileModuleResolver::new_with_path(dir.into());
        self.with_loader(Arc::new(resolver))
    }
}

impl fmt::Debug for HostPluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostPluginDescriptor")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}

impl From<&HostPluginSpec> for HostPluginDescriptor {
    fn from(spec: &HostPluginSpec) -> Self {
        let mut descriptor = HostPluginDescriptor::new(spec.id.clone());
        for id in &spec.dependencies {
            descriptor = descriptor.with_dependency(id.clone());
        }
        for id in &spec.optional_dependencies {
            descriptor = descriptor.with_optional_dependency(id.clone());
        }
        match &spec.modules_dir {
            Some(dir) => descriptor.with_modules_dir(dir.clone()),
            None => descriptor,
        }
    }
}

/// Lookup of installed host plugins by id
pub trait HostPluginRegistry: Send + Sync {
    fn find(&self, id: &str) -> Option<HostPluginDescriptor>;
}

/// Host plugin registry kept in memory
#[derive(Default)]
pub struct InMemoryHostRegistry {
    plugins: RwLock<HashMap<String, HostPluginDescriptor>>,
}

impl InMemoryHostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the core and host plugins named by `config` plus every
    /// configured host plugin.
    pub fn from_config(config: &LivePluginConfig) -> Self {
        let registry = Self::new();
        registry.register(HostPluginDescriptor::new(config.core_plugin_id.clone()));
        registry.register(
            HostPluginDescriptor::new(config.host_plugin_id.clone())
                .with_dependency(config.core_plugin_id.clone()),
        );
        for spec in &config.host_plugins {
            registry.register(HostPluginDescriptor::from(spec));
        }
        registry
    }

    /// Adds or replaces a descriptor, returning the previous one.
    pub fn register(&self, descriptor: HostPluginDescriptor) -> Option<HostPluginDescriptor> {
        self.plugins
            .write()
            .insert(descriptor.id.clone(), descriptor)
    }

    pub fn remove(&self, id: &str) -> Option<HostPluginDescriptor> {
        self.plugins.write().remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.plugins.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl HostPluginRegistry for InMemoryHostRegistry {
    fn find(&self, id: &str) -> Option<HostPluginDescriptor> {
        self.plugins.read().get(id).cloned()
    }
}
