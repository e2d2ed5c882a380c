//! liveplug kernel
//!
//! Shared vocabulary of the live plugin runtime: the error taxonomy, the
//! per-instance lifecycle states, the scoped disposal handle every loaded
//! plugin owns, and the configuration loader used by the other crates.

// plugin module
pub mod plugin;
pub use plugin::*;

// config module
pub mod config;
