//! CLI command implementations

pub mod adapters;
pub mod fetch;
pub mod predict;
pub mod setup;
