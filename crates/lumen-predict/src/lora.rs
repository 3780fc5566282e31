//! Style adapter (LoRA) resolution
//!
//! Turns the comma-separated URL and weight strings of a prediction into
//! adapter files on disk, checks each against the engine's registry, and
//! produces the prompt tags plus the matching batched load call. A tag is
//! only ever appended together with a load entry of the same name and
//! weight.

use crate::engine::{AdapterLoad, Engine};
use lumen_asset::{AssetCache, AssetKind, RemoteAsset};
use lumen_core::{LumenError, Result};
use std::path::PathBuf;

/// Weight for adapters the caller gave no weight for
pub const DEFAULT_ADAPTER_WEIGHT: f64 = 0.7;
/// Extension every adapter file is stored with
pub const ADAPTER_EXTENSION: &str = "safetensors";

/// One requested adapter after registry validation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAdapter {
    pub name: String,
    pub weight: f64,
    pub valid: bool,
}

/// Outcome of [`AdapterResolver::resolve`]
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Prompt with one `<lora:name:weight>` tag per valid adapter
    pub prompt: String,
    /// Every adapter that was downloaded, valid or not, in request order
    pub adapters: Vec<ResolvedAdapter>,
    /// What was passed to the engine (empty when nothing was loaded)
    pub load: AdapterLoad,
}

impl Resolution {
    fn unchanged(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            adapters: Vec::new(),
            load: AdapterLoad::default(),
        }
    }
}

/// Split a comma-separated URL list, dropping blank entries
pub fn parse_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Local file name for the adapter at `url`.
///
/// Uses the last path segment before any query string, falls back to
/// `lora_{index + 1}.safetensors`, and always ends in `.safetensors`.
pub fn adapter_file_name(url: &str, index: usize) -> String {
    let path = url.split('?').next().unwrap_or_default();
    let base = path.rsplit('/').next().unwrap_or_default();

    let mut name = if base.is_empty() {
        format!("lora_{}.{}", index + 1, ADAPTER_EXTENSION)
    } else {
        base.to_string()
    };
    let suffix = format!(".{}", ADAPTER_EXTENSION);
    if !name.ends_with(&suffix) {
        name.push_str(&suffix);
    }
    name
}

/// Canonical adapter name: the file name without `.safetensors`
pub fn adapter_name(file_name: &str) -> String {
    file_name
        .strip_suffix(&format!(".{}", ADAPTER_EXTENSION))
        .unwrap_or(file_name)
        .to_string()
}

/// Parse comma-separated weights. Blank tokens are skipped; any other
/// token that is not a number rejects the whole list.
pub fn parse_weights(raw: &str) -> Result<Vec<f64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|token| {
            token.parse::<f64>().map_err(|e| LumenError::WeightParse {
                token: token.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Pad with [`DEFAULT_ADAPTER_WEIGHT`] or truncate to exactly `count`
pub fn reconcile_weights(mut weights: Vec<f64>, count: usize) -> Vec<f64> {
    weights.resize(count, DEFAULT_ADAPTER_WEIGHT);
    weights
}

/// Prompt tag that activates `name` at `weight`
pub fn adapter_tag(name: &str, weight: f64) -> String {
    format!("<lora:{}:{}>", name, weight)
}

/// Downloads, validates and loads the adapters of one prediction
pub struct AdapterResolver<'a> {
    cache: &'a AssetCache,
    adapters_dir: PathBuf,
}

impl<'a> AdapterResolver<'a> {
    pub fn new(cache: &'a AssetCache, adapters_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            adapters_dir: adapters_dir.into(),
        }
    }

    /// Resolve `urls`/`weights_raw` against the engine and append the
    /// tags of the adapters that passed to `prompt`.
    ///
    /// Failed downloads and unknown names are logged and skipped. A
    /// malformed weight, a registry query failure or a load failure
    /// is returned as an error.
    pub fn resolve(
        &self,
        urls: &str,
        weights_raw: &str,
        prompt: &str,
        engine: &mut dyn Engine,
    ) -> Result<Resolution> {
        let urls = parse_urls(urls);
        if urls.is_empty() {
            return Ok(Resolution::unchanged(prompt));
        }

        // Parsed up front so a malformed list fails before any download
        let weights = parse_weights(weights_raw)?;

        let mut fetched = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let file_name = adapter_file_name(url, index);
            let asset = RemoteAsset::new(
                url.clone(),
                self.adapters_dir.join(&file_name),
                AssetKind::StyleAdapter,
            );
            match self.cache.ensure(&asset) {
                Ok(_) => fetched.push(adapter_name(&file_name)),
                Err(e) => {
                    tracing::warn!(
                        adapter = index + 1,
                        url = %url,
                        error = %e,
                        "skipping adapter"
                    );
                }
            }
        }

        if !self.cache.is_cached(&self.adapters_dir) {
            tracing::warn!(
                dir = %self.adapters_dir.display(),
                "adapter directory not found, skipping adapters"
            );
            return Ok(Resolution::unchanged(prompt));
        }
        if fetched.is_empty() {
            tracing::warn!("no adapter could be downloaded");
            return Ok(Resolution::unchanged(prompt));
        }

        if let Ok(files) = self.cache.list_dir(&self.adapters_dir, ADAPTER_EXTENSION) {
            tracing::debug!(?files, "adapter files on disk");
        }

        // Newly downloaded files are only visible after a rescan
        let registry = engine.list_available_adapters()?;

        let mut resolution = Resolution::unchanged(prompt);
        // Weights pair with the names that survived the download phase
        let weights = reconcile_weights(weights, fetched.len());
        for (name, weight) in fetched.into_iter().zip(weights) {
            let valid = registry.contains(&name);
            if valid {
                resolution.prompt.push(' ');
                resolution.prompt.push_str(&adapter_tag(&name, weight));
                resolution.load.push(name.clone(), weight);
                tracing::info!(adapter = %name, weight, "applying adapter");
            } else {
                let error = LumenError::AdapterNotFound(name.clone());
                tracing::warn!(%error, "skipping adapter");
            }
            resolution.adapters.push(ResolvedAdapter { name, weight, valid });
        }

        if resolution.load.is_empty() {
            tracing::info!("no valid adapters to load");
        } else {
            engine.load_adapters(&resolution.load)?;
            tracing::info!(count = resolution.load.len(), "adapters loaded");
        }

        Ok(resolution)
    }
}
