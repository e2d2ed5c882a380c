//! Filesystem watching for live plugin roots
//!
//! Deleting a plugin directory must unload the plugin everywhere; the watcher
//! reports such deletions.

mod watcher;

pub use watcher::{PluginRootWatcher, WatchConfig};
