//! Single cached download

use anyhow::Result;
use lumen_asset::{AssetCache, AssetKind, FetchOutcome, RemoteAsset};
use lumen_predict::LumenConfig;
use std::path::Path;

pub fn run(config: &LumenConfig, url: &str, dest: &Path, base_model: bool) -> Result<()> {
    let kind = if base_model {
        AssetKind::BaseModel
    } else {
        AssetKind::StyleAdapter
    };
    let cache = AssetCache::on_disk(config.fetcher()?);
    let asset = RemoteAsset::new(url, dest, kind);

    match cache.ensure(&asset)? {
        FetchOutcome::Cached => println!("Already cached: {}", dest.display()),
        FetchOutcome::Fetched { elapsed, hash } => {
            println!("Downloaded {}: {}", kind, dest.display());
            if let Some(hash) = hash {
                println!("  Hash: {}", hash.to_prefixed_hex());
            }
            println!("  Done in {:.1}s", elapsed.as_secs_f64());
        }
    }
    Ok(())
}
