//! CLI command implementations

pub mod check;
pub mod clean;
pub mod list;
pub mod load;
