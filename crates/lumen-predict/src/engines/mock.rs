//! Mock engine for testing
//!
//! Renders solid-color PNGs without a GPU or network, keeps a configurable
//! adapter registry, and records every call. Clones share state, so a test
//! can hand one clone to a `Predictor` and inspect the other.

use crate::engine::*;
use crate::request::GenerationRequest;
use base64::{engine::general_purpose, Engine as _};
use lumen_core::{LumenError, Result};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

const FIRST_RANDOM_SEED: i64 = 1000;

#[derive(Default)]
struct MockState {
    registry: AdapterRegistry,
    scan_dir: Option<PathBuf>,
    next_seed: i64,
    failure: Option<String>,
    options: Option<EngineOptions>,
    requests: Vec<GenerationRequest>,
    load_calls: Vec<AdapterLoad>,
    registry_queries: usize,
}

/// An engine that generates placeholder images locally
#[derive(Clone)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        let state = MockState {
            next_seed: FIRST_RANDOM_SEED,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Engine whose registry already knows `names`
    pub fn with_adapters<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let engine = Self::new();
        engine.state().registry = names.into_iter().collect();
        engine
    }

    /// Also register every `.safetensors` file found in `dir` on each
    /// registry refresh, the way the real engine rescans its folder
    pub fn scanning(dir: impl Into<PathBuf>) -> Self {
        let engine = Self::new();
        engine.state().scan_dir = Some(dir.into());
        engine
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register_adapter(&self, name: &str, alias: Option<&str>) {
        self.state().registry.insert(name, alias);
    }

    /// Make every following `generate` call fail with `message`
    pub fn fail_generation(&self, message: impl Into<String>) {
        self.state().failure = Some(message.into());
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.state().requests.clone()
    }

    pub fn load_calls(&self) -> Vec<AdapterLoad> {
        self.state().load_calls.clone()
    }

    pub fn registry_queries(&self) -> usize {
        self.state().registry_queries
    }

    pub fn applied_options(&self) -> Option<EngineOptions> {
        self.state().options.clone()
    }
}

impl Engine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn configure(&mut self, options: &EngineOptions) -> Result<()> {
        self.state().options = Some(options.clone());
        Ok(())
    }

    fn generate(&mut self, request: &GenerationRequest) -> Result<GenerationResult> {
        let mut state = self.state();
        state.requests.push(request.clone());

        if let Some(message) = &state.failure {
            return Err(LumenError::EngineCall(message.clone()));
        }

        // Seeds increase by one per image in the batch, as in the real engine
        let base_seed = if request.seed < 0 {
            let seed = state.next_seed;
            state.next_seed += request.batch_size as i64;
            seed
        } else {
            request.seed
        };

        let mut result = GenerationResult::default();
        for i in 0..request.batch_size {
            let seed = base_seed + i as i64;
            let png = solid_png(request.width, request.height, &request.prompt, seed)?;
            result.images.push(general_purpose::STANDARD.encode(png));
            result.per_image_seed.push(seed);
        }
        Ok(result)
    }

    fn list_available_adapters(&mut self) -> Result<AdapterRegistry> {
        let mut state = self.state();
        state.registry_queries += 1;

        let mut registry = state.registry.clone();
        if let Some(dir) = &state.scan_dir {
            if dir.exists() {
                for entry in std::fs::read_dir(dir)? {
                    let name = entry?.file_name().to_string_lossy().to_string();
                    if let Some(stem) = name.strip_suffix(".safetensors") {
                        registry.insert(stem, None);
                    }
                }
            }
        }
        Ok(registry)
    }

    fn load_adapters(&mut self, load: &AdapterLoad) -> Result<()> {
        self.state().load_calls.push(load.clone());
        Ok(())
    }
}

/// A PNG filled with a color derived from the prompt and seed
fn solid_png(width: u32, height: u32, prompt: &str, seed: i64) -> Result<Vec<u8>> {
    let hash_val = prompt
        .bytes()
        .chain(seed.to_le_bytes())
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    let color = image::Rgb([
        ((hash_val >> 16) & 0xFF) as u8,
        ((hash_val >> 8) & 0xFF) as u8,
        (hash_val & 0xFF) as u8,
    ]);

    let img = image::RgbImage::from_pixel(width, height, color);
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| LumenError::EngineCall(format!("Failed to encode PNG: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{build_request, PredictionInput};

    fn request(seed: i64, batch: u32) -> GenerationRequest {
        let mut input = PredictionInput::new("mock sky");
        input.width = 16;
        input.height = 8;
        input.seed = seed;
        input.num_outputs = batch;
        build_request(&input, "mock sky")
    }

    #[test]
    fn test_generate_batch_with_fixed_seed() {
        let mut engine = MockEngine::new();
        let result = engine.generate(&request(42, 3)).unwrap();

        assert_eq!(result.images.len(), 3);
        assert_eq!(result.per_image_seed, vec![42, 43, 44]);

        let png = general_purpose::STANDARD.decode(&result.images[0]).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));
    }

    #[test]
    fn test_random_seeds_do_not_repeat() {
        let mut engine = MockEngine::new();
        let first = engine.generate(&request(-1, 2)).unwrap();
        let second = engine.generate(&request(-1, 1)).unwrap();
        assert_eq!(first.per_image_seed, vec![1000, 1001]);
        assert_eq!(second.per_image_seed, vec![1002]);
    }

    #[test]
    fn test_failure_is_engine_call_error() {
        let mut engine = MockEngine::new();
        engine.fail_generation("out of memory");
        let err = engine.generate(&request(1, 1)).unwrap_err();
        assert!(matches!(err, LumenError::EngineCall(ref m) if m == "out of memory"));
        assert_eq!(engine.requests().len(), 1);
    }

    #[test]
    fn test_clones_share_recorded_calls() {
        let engine = MockEngine::with_adapters(["a"]);
        let mut handle = engine.clone();

        let mut load = AdapterLoad::default();
        load.push("a", 0.5);
        handle.load_adapters(&load).unwrap();
        assert!(handle.list_available_adapters().unwrap().contains("a"));

        assert_eq!(engine.load_calls(), vec![load]);
        assert_eq!(engine.registry_queries(), 1);
    }

    #[test]
    fn test_scanning_registry_sees_new_files() {
        let dir = std::env::temp_dir().join(format!("lumen_mock_scan_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut engine = MockEngine::scanning(&dir);

        assert!(!engine.list_available_adapters().unwrap().contains("fresh"));
        std::fs::write(dir.join("fresh.safetensors"), b"weights").unwrap();
        std::fs::write(dir.join("readme.txt"), b"").unwrap();

        let registry = engine.list_available_adapters().unwrap();
        assert!(registry.contains("fresh"));
        assert!(!registry.contains("readme"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
