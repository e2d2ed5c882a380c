//! Live plugin descriptors and plugin-root discovery
//!
//! A live plugin is a directory directly below a plugin root: the global
//! plugins directory or any `.spp/plugins` directory. Its id is the directory
//! name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use liveplug_kernel::plugin::{ContextId, InstanceKey};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A plugin directory on disk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LivePlugin {
    id: String,
    path: PathBuf,
}

impl LivePlugin {
    /// Describes the plugin rooted at `path`; the id is the last path segment.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { id, path }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn instance_key(&self, context: &ContextId) -> InstanceKey {
        InstanceKey::new(self.id.clone(), context.clone())
    }

    /// Every regular file under the plugin directory, recursively.
    pub fn all_files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    }

    /// First file anywhere in the plugin directory called `name`.
    pub fn entry_script(&self, name: &str) -> Option<PathBuf> {
        self.all_files()
            .into_iter()
            .find(|path| path.file_name().is_some_and(|n| n == name))
    }
}

/// Rules deciding which directories are live plugins
#[derive(Debug, Clone)]
pub struct PluginRoots {
    global_root: PathBuf,
    project_subpath: PathBuf,
    metadata_dir_name: String,
}

impl PluginRoots {
    pub fn new(
        global_root: impl Into<PathBuf>,
        project_subpath: impl Into<PathBuf>,
        metadata_dir_name: impl Into<String>,
    ) -> Self {
        Self {
            global_root: global_root.into(),
            project_subpath: project_subpath.into(),
            metadata_dir_name: metadata_dir_name.into(),
        }
    }

    pub fn global_root(&self) -> &Path {
        &self.global_root
    }

    /// Whether `path` is itself the root directory of a live plugin.
    ///
    /// Existing non-directories are rejected. A path that no longer exists
    /// still qualifies by location, so deleted plugins can be recognised.
    pub fn is_plugin_root(&self, path: &Path) -> bool {
        if path.exists() && !path.is_dir() {
            return false;
        }
        let Some(name) = path.file_name() else {
            return false;
        };
        if name == self.metadata_dir_name.as_str() {
            return false;
        }
        let Some(parent) = path.parent() else {
            return false;
        };
        parent == self.global_root
            || (!self.project_subpath.as_os_str().is_empty()
                && parent.ends_with(&self.project_subpath))
    }

    /// Maps arbitrary paths to the plugins containing them.
    ///
    /// Each path is walked upwards to the first plugin root. Paths outside any
    /// plugin are dropped; the result has no duplicates and keeps first-seen
    /// order.
    pub fn resolve_from_files<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<LivePlugin> {
        let mut seen = HashSet::new();
        let mut plugins = Vec::new();
        for path in paths {
            let Some(root) = path
                .as_ref()
                .ancestors()
                .find(|candidate| self.is_plugin_root(candidate))
            else {
                debug!("{} is not inside a live plugin", path.as_ref().display());
                continue;
            };
            if seen.insert(root.to_path_buf()) {
                plugins.push(LivePlugin::new(root));
            }
        }
        plugins
    }

    /// Immediate sub-directories of `root`, excluding the metadata directory.
    ///
    /// A missing root yields nothing. Order follows the directory listing.
    pub fn discover(&self, root: &Path) -> Vec<LivePlugin> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Cannot list plugin root {}: {}", root.display(), e);
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|entry| entry.file_name() != self.metadata_dir_name.as_str())
            .map(|entry| LivePlugin::new(entry.path()))
            .collect()
    }
}
