use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

pub mod disposable;
pub mod error;
pub use disposable::Disposable;
pub use error::{ErrorCause, PluginError, ScriptFailure};

/// Plugin operation result type using the typed [`PluginError`].
pub type PluginResult<T> = Result<T, PluginError>;


// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle state of one loaded plugin instance
///
/// `Unloaded` is both the initial and the final state; `Loaded` is the only
/// steady state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginState {
    Unloaded,
    Resolving,
    ClassLoaded,
    Compiled,
    Running,
    Loaded,
    Unloading,
}

impl PluginState {
    /// Whether the instance currently holds live registrations.
    pub fn is_loaded(&self) -> bool {
        matches!(self, PluginState::Loaded)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginState::Unloaded => "unloaded",
            PluginState::Resolving => "resolving",
            PluginState::ClassLoaded => "class-loaded",
            PluginState::Compiled => "compiled",
            PluginState::Running => "running",
            PluginState::Loaded => "loaded",
            PluginState::Unloading => "unloading",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Contexts and instance identity
// ============================================================================

/// Owner of a set of loaded plugins: the whole process or one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContextId {
    Process,
    Project(PathBuf),
}

impl ContextId {
    pub fn project(base_path: impl Into<PathBuf>) -> Self {
        ContextId::Project(base_path.into())
    }

    pub fn project_path(&self) -> Option<&Path> {
        match self {
            ContextId::Process => None,
            ContextId::Project(path) => Some(path),
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Process => f.write_str("process"),
            ContextId::Project(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Identity of a loaded plugin: the same plugin loaded into two contexts is
/// tracked as two instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub plugin_id: String,
    pub context: ContextId,
}

impl InstanceKey {
    pub fn new(plugin_id: impl Into<String>, context: ContextId) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            context,
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.plugin_id, self.context)
    }
}

/// Execution environment handed to a plugin entry point
#[derive(Debug, Clone)]
pub struct Binding {
    /// Owning context
    pub context: ContextId,
    /// Loaded while the host was starting up rather than on demand
    pub is_startup: bool,
    /// Plugin root directory
    pub plugin_path: PathBuf,
    /// Disposal scope of this instance
    pub disposable: Disposable,
}

impl Binding {
    pub fn new(
        context: ContextId,
        is_startup: bool,
        plugin_path: impl Into<PathBuf>,
        disposable: Disposable,
    ) -> Self {
        Self {
            context,
            is_startup,
            plugin_path: plugin_path.into(),
            disposable,
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// User-facing message produced by the runtime or by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Plugin the message is about, if any
    pub plugin_id: Option<String>,
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
    /// Console output rather than a balloon
    pub console: bool,
}

impl Notification {
    pub fn info(plugin_id: Option<&str>, title: &str, message: &str) -> Self {
        Self {
            plugin_id: plugin_id.map(str::to_string),
            title: title.to_string(),
            message: message.to_string(),
            level: NotificationLevel::Info,
            console: false,
        }
    }

    pub fn error(plugin_id: Option<&str>, title: &str, message: &str) -> Self {
        Self {
            level: NotificationLevel::Error,
            ..Self::info(plugin_id, title, message)
        }
    }

    pub fn console(mut self) -> Self {
        self.console = true;
        self
    }
}

/// Sink for notifications; the host renders them.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        let plugin = n.plugin_id.as_deref().unwrap_or("-");
        match n.level {
            NotificationLevel::Info => info!(plugin, title = %n.title, "{}", n.message),
            NotificationLevel::Warning => warn!(plugin, title = %n.title, "{}", n.message),
            NotificationLevel::Error => error!(plugin, title = %n.title, "{}", n.message),
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingNotifier {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.received.lock())
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        self.received.lock().push(notification);
    }
}
