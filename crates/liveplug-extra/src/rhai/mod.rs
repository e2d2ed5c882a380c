//! Rhai script engine integration
//!
//! Builds the per-plugin `rhai::Engine` (limits, logging hooks, JSON helpers)
//! and compiles plugin sources. Module resolution and the plugin callback API
//! are installed on top of it by `liveplug-plugins`.

pub mod engine;
pub mod error;

pub use engine::*;
pub use error::*;
