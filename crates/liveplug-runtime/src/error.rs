//! Runtime errors

use thiserror::Error;

/// Errors raised by the lifecycle hooks themselves. Per-plugin failures are
/// reported in the batch results instead.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Couldn't extract bundled plugins: {0}")]
    Resources(#[from] std::io::Error),

    #[error("Couldn't watch plugin roots: {0}")]
    Watch(#[from] notify::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
