//! liveplug extra modules
//!
//! Rhai engine construction shared by every live plugin runner.

#[cfg(feature = "rhai-scripting")]
pub mod rhai;
