//! Generation engine trait and the types that cross it

use lumen_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::request::GenerationRequest;

/// What the engine produced for one request.
///
/// `images[i]` was generated from `per_image_seed[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResult {
    /// Base64-encoded PNGs
    pub images: Vec<String>,
    pub per_image_seed: Vec<i64>,
}

/// Adapter names and aliases the engine currently recognizes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterRegistry {
    names: BTreeSet<String>,
    aliases: BTreeSet<String>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, alias: Option<&str>) {
        self.names.insert(name.into());
        if let Some(alias) = alias.filter(|a| !a.is_empty()) {
            self.aliases.insert(alias.to_string());
        }
    }

    /// True when `name` is a known adapter name or alias
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name) || self.aliases.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for AdapterRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut registry = Self::new();
        for name in iter {
            registry.insert(name, None);
        }
        registry
    }
}

/// Arguments of one batched adapter load, as parallel arrays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterLoad {
    pub names: Vec<String>,
    /// Text-encoder multipliers
    pub te_weights: Vec<f64>,
    /// UNet multipliers
    pub unet_weights: Vec<f64>,
    /// Per-adapter dimension overrides; unused, always `None`
    pub dims: Vec<Option<u32>>,
}

impl AdapterLoad {
    pub fn push(&mut self, name: impl Into<String>, weight: f64) {
        self.names.push(name.into());
        self.te_weights.push(weight);
        self.unet_weights.push(weight);
        self.dims.push(None);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One-time engine settings applied at startup, never per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_unet_storage_dtype")]
    pub unet_storage_dtype: String,
    /// Checkpoint file name; `None` means the configured base model
    #[serde(default)]
    pub checkpoint: Option<String>,
    /// Total GPU memory in MB, when known
    #[serde(default)]
    pub total_vram_mb: Option<u64>,
    /// Share of VRAM reserved for inference; the rest holds weights
    #[serde(default = "default_inference_memory_fraction")]
    pub inference_memory_fraction: f64,
    /// Async weight swapping instead of the queue method
    #[serde(default = "default_true")]
    pub async_swap: bool,
    /// Swap through shared (pinned) memory instead of CPU memory
    #[serde(default = "default_true")]
    pub pin_shared_memory: bool,
}

fn default_preset() -> String {
    "flux".to_string()
}
fn default_unet_storage_dtype() -> String {
    "Automatic (fp16 LoRA)".to_string()
}
fn default_inference_memory_fraction() -> f64 {
    0.1
}
fn default_true() -> bool {
    true
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            unet_storage_dtype: default_unet_storage_dtype(),
            checkpoint: None,
            total_vram_mb: None,
            inference_memory_fraction: default_inference_memory_fraction(),
            async_swap: true,
            pin_shared_memory: true,
        }
    }
}

impl EngineOptions {
    /// MB reserved for inference, if total VRAM is known
    pub fn inference_memory_mb(&self) -> Option<u64> {
        self.total_vram_mb
            .map(|total| (total as f64 * self.inference_memory_fraction) as u64)
    }

    /// MB left for model weights, if total VRAM is known
    pub fn model_memory_mb(&self) -> Option<u64> {
        let total = self.total_vram_mb?;
        Some(total.saturating_sub(self.inference_memory_mb().unwrap_or(0)))
    }
}

/// A text-to-image engine (Forge web API, mock)
pub trait Engine: Send {
    /// Engine name (e.g. "forge", "mock")
    fn name(&self) -> &str;

    /// Apply startup options. Called once, before the first request.
    fn configure(&mut self, options: &EngineOptions) -> Result<()>;

    /// Run one txt2img request to completion (blocking)
    fn generate(&mut self, request: &GenerationRequest) -> Result<GenerationResult>;

    /// Rescan and return the adapters the engine can load
    fn list_available_adapters(&mut self) -> Result<AdapterRegistry>;

    /// Load a batch of adapters for the next generation
    fn load_adapters(&mut self, load: &AdapterLoad) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_matches_names_and_aliases() {
        let mut registry = AdapterRegistry::new();
        registry.insert("ink_wash_v2", Some("ink"));
        registry.insert("film_grain", Some(""));

        assert!(registry.contains("ink_wash_v2"));
        assert!(registry.contains("ink"));
        assert!(registry.contains("film_grain"));
        assert!(!registry.contains(""));
        assert!(!registry.contains("watercolor"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_adapter_load_parallel_arrays() {
        let mut load = AdapterLoad::default();
        load.push("a", 0.9);
        load.push("b", 0.7);

        assert_eq!(load.len(), 2);
        assert_eq!(load.te_weights, load.unet_weights);
        assert_eq!(load.te_weights, vec![0.9, 0.7]);
        assert_eq!(load.dims, vec![None, None]);
    }

    #[test]
    fn test_memory_split() {
        let options = EngineOptions {
            total_vram_mb: Some(24_000),
            ..Default::default()
        };
        assert_eq!(options.inference_memory_mb(), Some(2_400));
        assert_eq!(options.model_memory_mb(), Some(21_600));
        assert_eq!(EngineOptions::default().inference_memory_mb(), None);
    }
}
