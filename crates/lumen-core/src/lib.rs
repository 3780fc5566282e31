//! Lumen Core - Shared types for the Lumen prediction adapter
//!
//! This crate provides what every other Lumen crate depends on:
//! - `LumenError` - The error taxonomy of a prediction, and the `Result` alias
//! - `ContentHash` - SHA-256 digests recorded for downloaded weights

mod error;
mod hash;

pub use error::{LumenError, Result};
pub use hash::ContentHash;
