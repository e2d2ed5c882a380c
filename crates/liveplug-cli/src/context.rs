//! Shared state of one CLI invocation

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use liveplug_plugins::{LivePluginConfig, LivePluginManager};
use liveplug_runtime::LivePluginRuntime;
use tracing::debug;

pub struct CliContext {
    pub config: LivePluginConfig,
    pub runtime: Arc<LivePluginRuntime>,
    pub json: bool,
}

impl CliContext {
    pub fn new(config_path: Option<&Path>, json: bool) -> anyhow::Result<Self> {
        let config = LivePluginConfig::load(config_path).with_context(|| match config_path {
            Some(path) => format!("Failed to load config {}", path.display()),
            None => "Failed to load config from environment".to_string(),
        })?;
        debug!(
            "Global plugins in {}, compile output in {}",
            config.global_plugins_dir.display(),
            config.compiled_dir.display()
        );
        let manager = LivePluginManager::builder(config.clone()).build();

        Ok(Self {
            config,
            runtime: LivePluginRuntime::new(manager),
            json,
        })
    }

    pub fn manager(&self) -> &Arc<LivePluginManager> {
        self.runtime.manager()
    }
}
