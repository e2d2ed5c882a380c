//! Plugin root watcher
//!
//! Monitors plugin root directories and reports plugin directories that were
//! removed (deleted or moved away).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::descriptor::PluginRoots;

/// Watch configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Repeated removals of the same path within this window are reported once
    pub debounce_duration: Duration,
    /// Poll interval for platforms without native notifications
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl WatchConfig {
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce_duration = duration;
        self
    }
}

/// Reports removed plugin directories below the watched roots
pub struct PluginRootWatcher {
    roots: PluginRoots,
    config: WatchConfig,
    watch_paths: Vec<PathBuf>,
    event_tx: mpsc::Sender<PathBuf>,
    event_rx: Option<mpsc::Receiver<PathBuf>>,
    watcher: Option<RecommendedWatcher>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl PluginRootWatcher {
    pub fn new(roots: PluginRoots, config: WatchConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            roots,
            config,
            watch_paths: Vec::new(),
            event_tx,
            event_rx: Some(event_rx),
            watcher: None,
            shutdown_tx: None,
        }
    }

    /// Take the receiver of removed plugin roots (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<PathBuf>> {
        self.event_rx.take()
    }

    /// Adds a plugin root directory. Missing directories are skipped.
    pub fn watch<P: AsRef<Path>>(&mut self, path: P) -> Result<(), notify::Error> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            warn!("Watch path does not exist: {:?}", path);
            return Ok(());
        }
        if self.watch_paths.contains(&path) {
            return Ok(());
        }

        info!("Adding watch path: {:?}", path);
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.watch(&path, RecursiveMode::Recursive)?;
        }
        self.watch_paths.push(path);
        Ok(())
    }

    pub fn unwatch<P: AsRef<Path>>(&mut self, path: P) -> Result<(), notify::Error> {
        let path = path.as_ref();
        info!("Removing watch path: {:?}", path);
        self.watch_paths.retain(|p| p != path);
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.unwatch(path)?;
        }
        Ok(())
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watch_paths
    }

    /// Starts delivering events. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), notify::Error> {
        info!("Starting plugin root watcher");

        let (tx, mut rx) = mpsc::channel::<Event>(1024);
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let _ = tx.blocking_send(event);
                }
                Err(e) => warn!("Watch error: {}", e),
            },
            Config::default().with_poll_interval(self.config.poll_interval),
        )?;
        for path in &self.watch_paths {
            watcher.watch(path, RecursiveMode::Recursive)?;
        }
        self.watcher = Some(watcher);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let roots = self.roots.clone();
        let debounce = self.config.debounce_duration;
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut last_sent: HashMap<PathBuf, Instant> = HashMap::new();
            loop {
                tokio::select! {
                    Some(event) = rx.recv() => {
                        if !is_removal(&event.kind) {
                            continue;
                        }
                        for path in event.paths {
                            if path.exists() || !roots.is_plugin_root(&path) {
                                continue;
                            }
                            if !debounced_send(&mut last_sent, &path, Instant::now(), debounce) {
                                debug!("Debounced removal of {:?}", path);
                                continue;
                            }

                            debug!("Plugin root removed: {:?}", path);
                            if event_tx.send(path).await.is_err() {
                                error!("Failed to send watch event");
                                return;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Plugin root watcher shutting down");
                        return;
                    }
                }
            }
        });

        Ok(())
    }

    pub async fn stop(&mut self) {
        info!("Stopping plugin root watcher");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        self.watcher = None;
    }
}

/// Records `path` as sent at `now` unless it was sent within `debounce`.
/// Entries older than `debounce` are dropped on the way.
fn debounced_send(
    last_sent: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    debounce: Duration,
) -> bool {
    last_sent.retain(|_, at| now.duration_since(*at) < debounce);
    if last_sent.contains_key(path) {
        return false;
    }
    last_sent.insert(path.to_path_buf(), now);
    true
}

fn is_removal(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::From))
            | EventKind::Modify(ModifyKind::Name(RenameMode::Any))
    )
}
