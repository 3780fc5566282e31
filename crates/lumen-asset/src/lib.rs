//! Lumen Asset - Idempotent acquisition of remote weight files
//!
//! Base model checkpoints and style adapters are cached on disk by path:
//! a file that already exists is never fetched again. The transport and the
//! filesystem checks are injected (`Fetch`, `Probe`) so callers can swap in
//! `MemoryFs` when no network or disk should be touched.

mod cache;
mod fetch;
mod memory;

pub use cache::{AssetCache, AssetKind, DiskProbe, FetchOutcome, Probe, RemoteAsset};
pub use fetch::{CommandFetcher, Fetch, HttpFetcher};
pub use memory::MemoryFs;
