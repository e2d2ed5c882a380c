//! Plugins shipped inside the runtime
//!
//! The scripts are embedded at build time and written out to a private
//! temporary directory, laid out like a project plugin root
//! (`<tmp>/.spp/plugins/<id>/plugin.rhai`). The directory is removed when the
//! [`BundledResources`] value is dropped.

use std::io;
use std::path::{Path, PathBuf};

use liveplug_plugins::PLUGIN_SCRIPT;
use tempfile::TempDir;
use tracing::{debug, info};

const BUNDLED: &[(&str, &str)] = &[
    (
        "self-info",
        include_str!("../resources/.spp/plugins/self-info/plugin.rhai"),
    ),
    (
        "quick-stats",
        include_str!("../resources/.spp/plugins/quick-stats/plugin.rhai"),
    ),
];

#[derive(Debug)]
pub struct BundledResources {
    dir: TempDir,
    plugins_root: PathBuf,
}

impl BundledResources {
    /// Writes every bundled plugin below a new temporary directory.
    ///
    /// `project_subpath` is the project plugin subpath, so extracted plugins
    /// are recognised as plugin roots like any project-local plugin.
    pub fn extract(project_subpath: &Path) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("liveplug-resources-")
            .tempdir()?;
        let plugins_root = dir.path().join(project_subpath);

        for (id, source) in BUNDLED {
            let root = plugins_root.join(id);
            std::fs::create_dir_all(&root)?;
            std::fs::write(root.join(PLUGIN_SCRIPT), source)?;
            debug!("Extracted bundled plugin '{}'", id);
        }

        info!(
            "Extracted {} bundled plugins to {}",
            BUNDLED.len(),
            plugins_root.display()
        );
        Ok(Self { dir, plugins_root })
    }

    /// Directory holding one sub-directory per bundled plugin.
    pub fn plugins_root(&self) -> &Path {
        &self.plugins_root
    }

    pub fn temp_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn ids() -> impl Iterator<Item = &'static str> {
        BUNDLED.iter().map(|(id, _)| *id)
    }
}
