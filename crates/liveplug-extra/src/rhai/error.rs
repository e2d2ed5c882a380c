//! Errors raised while preparing a plugin script.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RhaiError {
    /// The script (or a module it imports) does not compile.
    #[error("{}: {message}", path.display())]
    CompileError { path: PathBuf, message: String },

    /// The script file could not be read.
    #[error("Couldn't read script: {0}")]
    Io(#[from] std::io::Error),
}

pub type RhaiResult<T> = Result<T, RhaiError>;
