//! Compiled-artifact cache and per-plugin serialisation
//!
//! Every successful compilation leaves a manifest in
//! `<compiled_dir>/<plugin id>/compiled.json`. The directory is removed when
//! the plugin is deleted. [`KeyedLocks`] makes sure a plugin id is never being
//! compiled and deleted at the same time.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use liveplug_extra::rhai::CompiledScript;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

const MANIFEST_FILE: &str = "compiled.json";

/// What was compiled, from what, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileManifest {
    pub plugin_id: String,
    pub entry: PathBuf,
    /// Hex sha256 of the entry script source
    pub sha256: String,
    pub classpath: Vec<PathBuf>,
    pub compiled_at: chrono::DateTime<chrono::Utc>,
}

/// Output directory for compile manifests
#[derive(Debug, Clone)]
pub struct CompiledCache {
    root: PathBuf,
}

impl CompiledCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, plugin_id: &str) -> PathBuf {
        self.root.join(plugin_id)
    }

    /// Writes the manifest of `compiled` and returns its path.
    pub fn store(
        &self,
        plugin_id: &str,
        compiled: &CompiledScript,
        classpath: &[PathBuf],
    ) -> io::Result<PathBuf> {
        let dir = self.dir_for(plugin_id);
        std::fs::create_dir_all(&dir)?;

        let manifest = CompileManifest {
            plugin_id: plugin_id.to_string(),
            entry: compiled.path.clone(),
            sha256: hex::encode(Sha256::digest(compiled.source.as_bytes())),
            classpath: classpath.to_vec(),
            compiled_at: chrono::DateTime::from_timestamp(compiled.compiled_at, 0)
                .unwrap_or_else(chrono::Utc::now),
        };
        let json = serde_json::to_vec_pretty(&manifest).map_err(io::Error::other)?;

        let path = dir.join(MANIFEST_FILE);
        std::fs::write(&path, json)?;
        debug!("Wrote compile manifest {}", path.display());
        Ok(path)
    }

    /// Manifest of the last compilation of `plugin_id`, if readable.
    pub fn manifest(&self, plugin_id: &str) -> Option<CompileManifest> {
        let bytes = std::fs::read(self.dir_for(plugin_id).join(MANIFEST_FILE)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Deletes the output directory of `plugin_id`.
    ///
    /// Returns `false` if there was nothing to delete.
    pub fn remove(&self, plugin_id: &str) -> io::Result<bool> {
        match std::fs::remove_dir_all(self.dir_for(plugin_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// One async mutex per key, created on first use
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
