//! liveplug runtime
//!
//! Binds live plugin loading to host lifecycle events. Opening a process or
//! project context loads the bundled plugins and, for trusted projects, the
//! project's own plugins; closing it unloads them again; deleting a plugin
//! directory unloads it everywhere and drops its compile output.

pub mod error;
pub mod lifecycle;
pub mod resources;
pub mod state;
pub mod status;

pub use error::{RuntimeError, RuntimeResult};
pub use lifecycle::{LivePluginRuntime, LoadSummary};
pub use resources::BundledResources;
pub use state::{ContextState, HostContext};
pub use status::{PluginsStatus, StatusService};
