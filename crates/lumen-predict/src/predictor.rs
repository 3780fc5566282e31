//! One-shot predictions against an engine
//!
//! `Predictor` owns the asset cache and the engine handle. `setup` runs once
//! per process; `predict` runs once per request.

use crate::config::LumenConfig;
use crate::engine::{AdapterRegistry, Engine};
use crate::engines::create_engine;
use crate::lora::{parse_urls, AdapterResolver};
use crate::materialize::{Materializer, OutputImage};
use crate::request::{build_request, PredictionInput};
use lumen_asset::{AssetCache, FetchOutcome};
use lumen_core::{LumenError, Result};
use std::time::Instant;

pub struct Predictor {
    config: LumenConfig,
    cache: AssetCache,
    engine: Box<dyn Engine>,
    materializer: Materializer,
}

impl Predictor {
    pub fn new(config: LumenConfig, cache: AssetCache, engine: Box<dyn Engine>) -> Self {
        let materializer = Materializer::new(config.paths.output_dir.clone());
        Self {
            config,
            cache,
            engine,
            materializer,
        }
    }

    /// Build the configured fetcher and engine. `engine_override` wins over
    /// `[engine] kind`.
    pub fn from_config(config: LumenConfig, engine_override: Option<&str>) -> Result<Self> {
        let engine_name = engine_override.unwrap_or(&config.engine.kind).to_string();
        let engine = create_engine(&engine_name, &config)?;
        let cache = AssetCache::on_disk(config.fetcher()?);
        Ok(Self::new(config, cache, engine))
    }

    pub fn config(&self) -> &LumenConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Make sure the base model is on disk, then push the startup options
    /// to the engine
    pub fn setup(&mut self) -> Result<FetchOutcome> {
        let asset = self.config.base_model_asset();
        let outcome = self.cache.ensure(&asset)?;
        self.engine.configure(&self.config.engine_options())?;
        tracing::info!(
            engine = self.engine.name(),
            model = %asset.local_path.display(),
            "setup complete"
        );
        Ok(outcome)
    }

    /// Fail early when the base model is not on disk yet
    pub fn require_base_model(&self) -> Result<()> {
        let path = self.config.base_model_path();
        if self.cache.is_cached(&path) {
            return Ok(());
        }
        Err(LumenError::Config(format!(
            "Base model not found at {}. Run `lumen setup` first",
            path.display()
        )))
    }

    /// Adapters the engine can currently activate
    pub fn list_adapters(&mut self) -> Result<AdapterRegistry> {
        self.engine.list_available_adapters()
    }

    /// Run one prediction and return the written images in batch order
    pub fn predict(&mut self, input: &PredictionInput) -> Result<Vec<OutputImage>> {
        input.validate()?;
        let start = Instant::now();

        let prompt = if parse_urls(&input.lora_urls).is_empty() {
            input.prompt.clone()
        } else {
            let resolver = AdapterResolver::new(&self.cache, self.config.paths.lora_dir());
            let resolution = resolver.resolve(
                &input.lora_urls,
                &input.lora_weights,
                &input.prompt,
                self.engine.as_mut(),
            )?;
            resolution.prompt
        };
        tracing::info!(%prompt, "final prompt");

        let request = build_request(input, prompt);
        let result = self.engine.generate(&request)?;
        let outputs = self.materializer.materialize(result)?;

        tracing::info!(
            images = outputs.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "prediction complete"
        );
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::mock::MockEngine;
    use lumen_asset::MemoryFs;
    use std::path::PathBuf;

    struct Fixture {
        predictor: Predictor,
        engine: MockEngine,
        fs: MemoryFs,
        output_dir: PathBuf,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.output_dir).ok();
        }
    }

    fn fixture(engine: MockEngine) -> Fixture {
        let output_dir =
            std::env::temp_dir().join(format!("lumen_predictor_test_{}", uuid::Uuid::new_v4()));
        let mut config = LumenConfig::default();
        config.paths.forge_root = PathBuf::from("/forge");
        config.paths.output_dir = output_dir.clone();

        let fs = MemoryFs::new();
        fs.insert_dir(config.paths.lora_dir());
        let cache = AssetCache::new(Box::new(fs.clone()), Box::new(fs.clone()));
        let predictor = Predictor::new(config, cache, Box::new(engine.clone()));
        Fixture {
            predictor,
            engine,
            fs,
            output_dir,
        }
    }

    fn small_input(prompt: &str) -> PredictionInput {
        let mut input = PredictionInput::new(prompt);
        input.width = 8;
        input.height = 8;
        input
    }

    #[test]
    fn test_predict_without_adapters() {
        let mut f = fixture(MockEngine::new());
        let mut input = small_input("a lighthouse");
        input.num_outputs = 2;
        input.seed = 111;

        let outputs = f.predictor.predict(&input).unwrap();
        assert_eq!(outputs.iter().map(|o| o.seed).collect::<Vec<_>>(), vec![111, 112]);
        assert!(outputs.iter().all(|o| o.path.exists()));

        let requests = f.engine.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, "a lighthouse");
        assert_eq!(f.engine.registry_queries(), 0);
        assert_eq!(f.fs.fetch_count(), 0);
    }

    #[test]
    fn test_predict_with_adapter() {
        let engine = MockEngine::with_adapters(["ink"]);
        let mut f = fixture(engine);
        let mut input = small_input("a heron");
        input.lora_urls = "https://host/ink.safetensors".to_string();
        input.lora_weights = "0.9".to_string();

        f.predictor.predict(&input).unwrap();
        assert_eq!(f.engine.requests()[0].prompt, "a heron <lora:ink:0.9>");
        assert_eq!(f.engine.load_calls().len(), 1);
        assert_eq!(f.fs.fetch_count(), 1);
    }

    #[test]
    fn test_invalid_input_runs_nothing() {
        let mut f = fixture(MockEngine::new());
        let mut input = small_input("too wide");
        input.width = 2048;
        input.lora_urls = "https://host/ink.safetensors".to_string();

        let err = f.predictor.predict(&input).unwrap_err();
        assert!(matches!(err, LumenError::ValueOutOfRange { ref field, .. } if field == "width"));
        assert!(f.engine.requests().is_empty());
        assert_eq!(f.fs.fetch_count(), 0);
    }

    #[test]
    fn test_engine_failure_propagates() {
        let engine = MockEngine::new();
        engine.fail_generation("CUDA out of memory");
        let mut f = fixture(engine);

        let err = f.predictor.predict(&small_input("x")).unwrap_err();
        assert!(matches!(err, LumenError::EngineCall(ref m) if m == "CUDA out of memory"));
        assert_eq!(std::fs::read_dir(&f.output_dir).map(|d| d.count()).unwrap_or(0), 0);
    }

    #[test]
    fn test_setup_fetches_base_model_once_and_configures() {
        let mut f = fixture(MockEngine::new());
        assert!(f.predictor.setup().unwrap().was_fetched());
        assert!(!f.predictor.setup().unwrap().was_fetched());
        assert_eq!(f.fs.fetch_count(), 1);

        let options = f.engine.applied_options().unwrap();
        assert_eq!(
            options.checkpoint.as_deref(),
            Some(f.predictor.config().base_model.file_name.as_str())
        );
    }

    #[test]
    fn test_setup_fails_when_base_model_unavailable() {
        let mut f = fixture(MockEngine::new());
        let url = f.predictor.config().base_model.url.clone();
        f.fs.fail_url(&url);

        let err = f.predictor.setup().unwrap_err();
        assert!(matches!(err, LumenError::FetchFailure { .. }));
        assert!(f.engine.applied_options().is_none());
    }

    #[test]
    fn test_require_base_model() {
        let mut f = fixture(MockEngine::new());
        let err = f.predictor.require_base_model().unwrap_err();
        assert!(matches!(err, LumenError::Config(ref m) if m.contains("lumen setup")));

        f.predictor.setup().unwrap();
        assert!(f.predictor.require_base_model().is_ok());
    }

    #[test]
    fn test_from_config_override() {
        let config = LumenConfig::default();
        let predictor = Predictor::from_config(config.clone(), Some("mock")).unwrap();
        assert_eq!(predictor.engine_name(), "mock");
        assert!(Predictor::from_config(config, Some("nope")).is_err());
    }
}
