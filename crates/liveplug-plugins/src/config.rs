//! Runtime configuration
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working setup rooted in the user's data directory.

use std::path::{Path, PathBuf};

use liveplug_extra::rhai::ScriptEngineConfig;
use liveplug_kernel::config::{ConfigResult, load_with_env};
use serde::{Deserialize, Serialize};

use crate::descriptor::PluginRoots;

/// Environment variable prefix for overrides, e.g. `LIVEPLUG_GLOBAL_PLUGINS_DIR`.
pub const ENV_PREFIX: &str = "LIVEPLUG";

/// Configuration of the live plugin runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivePluginConfig {
    /// Directory holding user-wide live plugins, one sub-directory per plugin
    pub global_plugins_dir: PathBuf,
    /// Project-relative directory holding project-local plugins
    pub project_plugins_subpath: PathBuf,
    /// Output directory for compile manifests, one sub-directory per plugin id
    pub compiled_dir: PathBuf,
    /// Name of the bookkeeping directory inside the global root; never a plugin
    pub metadata_dir_name: String,
    /// Id of the host plugin every live plugin implicitly depends on
    pub host_plugin_id: String,
    /// Id of the host core; excluded from dependency closures
    pub core_plugin_id: String,
    /// Directive adding a path or glob to the classpath
    pub classpath_keyword: String,
    /// Directive adding a host plugin dependency
    pub dependency_keyword: String,
    /// Host plugins available to `depends-on-plugin`
    pub host_plugins: Vec<HostPluginSpec>,
    /// Per-plugin script engine settings
    pub engine: ScriptEngineConfig,
}

/// Host plugin declared in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPluginSpec {
    pub id: String,
    pub dependencies: Vec<String>,
    pub optional_dependencies: Vec<String>,
    /// Directory of `.rhai` modules exported by this host plugin
    pub modules_dir: Option<PathBuf>,
}

impl Default for LivePluginConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("liveplug");
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("liveplug");

        Self {
            global_plugins_dir: data_dir.join("live-plugins"),
            project_plugins_subpath: PathBuf::from(".spp").join("plugins"),
            compiled_dir: cache_dir.join("live-plugins-compiled"),
            metadata_dir_name: ".liveplug".to_string(),
            host_plugin_id: "liveplug.host".to_string(),
            core_plugin_id: "liveplug.core".to_string(),
            classpath_keyword: "// add-to-classpath ".to_string(),
            dependency_keyword: "// depends-on-plugin ".to_string(),
            host_plugins: Vec::new(),
            engine: ScriptEngineConfig::default(),
        }
    }
}

impl LivePluginConfig {
    /// Loads the configuration from `path` (if any) with `LIVEPLUG_*`
    /// environment overrides on top.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        load_with_env(path, ENV_PREFIX)
    }

    /// Configuration rooted at `global_plugins_dir` with compile output
    /// under `compiled_dir`, everything else default.
    pub fn with_dirs(
        global_plugins_dir: impl Into<PathBuf>,
        compiled_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            global_plugins_dir: global_plugins_dir.into(),
            compiled_dir: compiled_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_host_plugin(mut self, spec: HostPluginSpec) -> Self {
        self.host_plugins.push(spec);
        self
    }

    pub fn roots(&self) -> PluginRoots {
        PluginRoots::new(
            self.global_plugins_dir.clone(),
            self.project_plugins_subpath.clone(),
            self.metadata_dir_name.clone(),
        )
    }

    /// Project-local plugin root for the project at `base_path`.
    pub fn project_plugins_dir(&self, base_path: &Path) -> PathBuf {
        base_path.join(&self.project_plugins_subpath)
    }
}
