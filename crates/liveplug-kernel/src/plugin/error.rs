//! Typed errors for the plugin sub-system.
//!
//! Only two failure kinds leave a per-plugin operation. A [`PluginError::LoadingError`]
//! means the runtime could not prepare the plugin (dependency resolution, module
//! loader construction, compilation, missing entry script). A
//! [`PluginError::RunningError`] means the plugin's own code raised while its
//! entry point was executing.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Shared, clonable error cause.
pub type ErrorCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur during plugin lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// The runtime failed to prepare the plugin.
    #[error("{message}")]
    LoadingError {
        /// Human-readable reason, names the offending path or dependency.
        message: String,
        /// Underlying failure, if any.
        #[source]
        cause: Option<ErrorCause>,
    },

    /// The plugin's entry point raised.
    #[error("{cause}")]
    RunningError {
        /// The error raised by the plugin code.
        #[source]
        cause: ErrorCause,
    },
}

impl PluginError {
    /// Creates a loading error without an underlying cause.
    pub fn loading(message: impl Into<String>) -> Self {
        Self::LoadingError {
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a loading error wrapping `cause`.
    pub fn loading_with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::LoadingError {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// Creates a running error wrapping the error raised by plugin code.
    pub fn running<E>(cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::RunningError {
            cause: Arc::new(cause),
        }
    }

    /// Creates a running error from a plain message.
    pub fn running_message(message: impl Into<String>) -> Self {
        Self::running(ScriptFailure(message.into()))
    }

    pub fn is_loading_error(&self) -> bool {
        matches!(self, Self::LoadingError { .. })
    }

    pub fn is_running_error(&self) -> bool {
        matches!(self, Self::RunningError { .. })
    }

    /// Short label used in notifications and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoadingError { .. } => "loading error",
            Self::RunningError { .. } => "running error",
        }
    }
}

/// Failure described only by text, used when plugin code reports several
/// problems at once (e.g. failed test functions).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ScriptFailure(pub String);
