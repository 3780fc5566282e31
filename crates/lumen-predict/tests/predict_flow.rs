//! End-to-end prediction with the mock engine and an in-memory download cache

use lumen_asset::{AssetCache, MemoryFs};
use lumen_predict::engines::mock::MockEngine;
use lumen_predict::{LumenConfig, PredictionInput, Predictor};
use std::path::PathBuf;

fn temp_output_dir() -> PathBuf {
    std::env::temp_dir().join(format!("lumen_flow_test_{}", uuid::Uuid::new_v4()))
}

#[test]
fn test_full_prediction_with_mixed_adapters() {
    let output_dir = temp_output_dir();
    let mut config = LumenConfig::default();
    config.paths.forge_root = PathBuf::from("/forge");
    config.paths.output_dir = output_dir.clone();

    let fs = MemoryFs::new();
    fs.insert_dir(config.paths.lora_dir());
    fs.fail_url("https://host/broken.safetensors");

    // "ghost" downloads fine but the engine never registers it. Weights
    // pair with the three downloaded names, so "film" gets the third one.
    let engine = MockEngine::with_adapters(["ink", "film"]);
    let cache = AssetCache::new(Box::new(fs.clone()), Box::new(fs.clone()));
    let mut predictor = Predictor::new(config, cache, Box::new(engine.clone()));

    let mut input = PredictionInput::new("a quiet harbor at dawn");
    input.width = 16;
    input.height = 16;
    input.num_outputs = 2;
    input.seed = 111;
    input.enable_hr = false;
    input.denoising_strength = 0.8;
    input.lora_urls = "https://host/ink.safetensors, https://host/broken.safetensors, \
                       https://host/ghost, https://host/film.safetensors?token=x"
        .to_string();
    input.lora_weights = "0.9,0.4,0.3".to_string();

    let outputs = predictor.predict(&input).unwrap();

    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].seed, 111);
    assert_eq!(outputs[1].seed, 112);
    for output in &outputs {
        assert_eq!(output.path.parent().unwrap(), output_dir.as_path());
        let img = image::open(&output.path).unwrap();
        assert_eq!((img.width(), img.height()), (16, 16));
    }

    let requests = engine.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].prompt,
        "a quiet harbor at dawn <lora:ink:0.9> <lora:film:0.3>"
    );
    assert_eq!(requests[0].batch_size, 2);
    assert_eq!(requests[0].denoising_strength, None);

    let loads = engine.load_calls();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].names, vec!["ink", "film"]);
    assert_eq!(loads[0].te_weights, vec![0.9, 0.3]);
    assert_eq!(requests[0].prompt.matches("<lora:").count(), loads[0].len());

    assert_eq!(fs.fetch_count(), 4);

    // Second run hits the cache for every adapter that made it to disk
    predictor.predict(&input).unwrap();
    assert_eq!(fs.fetch_count(), 5);
    assert_eq!(
        fs.fetched_urls().last().map(String::as_str),
        Some("https://host/broken.safetensors")
    );

    std::fs::remove_dir_all(&output_dir).ok();
}

#[test]
fn test_setup_then_predict_from_config_file() {
    let root = temp_output_dir();
    std::fs::create_dir_all(&root).unwrap();
    let config_path = root.join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[paths]
forge_root = "{root}"
output_dir = "{root}/out"

[engine]
kind = "mock"
"#,
            root = root.display()
        ),
    )
    .unwrap();

    let config = LumenConfig::load_from_file(&config_path).unwrap();
    let fs = MemoryFs::new();
    let cache = AssetCache::new(Box::new(fs.clone()), Box::new(fs.clone()));
    let engine = MockEngine::new();
    let mut predictor = Predictor::new(config, cache, Box::new(engine.clone()));

    predictor.setup().unwrap();
    assert!(engine.applied_options().is_some());

    let mut input = PredictionInput::new("lanterns");
    input.width = 8;
    input.height = 8;
    let outputs = predictor.predict(&input).unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].path.starts_with(root.join("out")));
    // Random seeds come from the engine
    assert_eq!(outputs[0].seed, 1000);

    std::fs::remove_dir_all(&root).ok();
}
