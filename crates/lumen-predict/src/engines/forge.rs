//! Stable Diffusion WebUI Forge engine
//!
//! Talks to a running Forge instance over its `/sdapi/v1` HTTP API.
//! Generation blocks until the whole batch is done; engine failures are
//! returned as-is and never retried.

use crate::config::LumenConfig;
use crate::engine::*;
use crate::request::GenerationRequest;
use lumen_core::{LumenError, Result};
use serde::Deserialize;
use std::time::Duration;

/// Largest response body accepted; a batch of four 1024px PNGs in base64
/// stays well below this
const MAX_RESPONSE_BYTES: u64 = 256 * 1024 * 1024;

/// Forge engine reached over HTTP
pub struct ForgeEngine {
    api_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    images: Vec<String>,
    /// JSON document encoded as a string
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgInfo {
    #[serde(default)]
    all_seeds: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct LoraEntry {
    name: String,
    #[serde(default)]
    alias: Option<String>,
}

impl ForgeEngine {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Create a new ForgeEngine from config
    pub fn from_config(config: &LumenConfig) -> Result<Self> {
        if config.engine.api_url.trim().is_empty() {
            return Err(LumenError::Config(
                "Forge API URL not configured. Set LUMEN_ENGINE_URL or [engine] api_url"
                    .to_string(),
            ));
        }
        Ok(Self::new(
            config.engine.api_url.clone(),
            Duration::from_secs(config.engine.timeout_secs),
        ))
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/sdapi/v1/{}", self.api_url, path)
    }

    fn build_agent(&self) -> ureq::Agent {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();
        config.into()
    }

    fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: &impl serde::Serialize,
    ) -> Result<T> {
        let url = self.endpoint(path);
        let mut response = self
            .build_agent()
            .post(&url)
            .header("Content-Type", "application/json")
            .send_json(payload)
            .map_err(|e| LumenError::EngineCall(format!("POST {} failed: {}", url, e)))?;

        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_string()
            .map_err(|e| {
                LumenError::EngineCall(format!("Failed to read {} response: {}", url, e))
            })?;

        serde_json::from_str(&body)
            .map_err(|e| LumenError::Decode(format!("Unexpected {} response: {}", url, e)))
    }

    /// POST whose response body carries nothing we need
    fn post_unit(&self, path: &str, payload: &impl serde::Serialize) -> Result<()> {
        let url = self.endpoint(path);
        self.build_agent()
            .post(&url)
            .header("Content-Type", "application/json")
            .send_json(payload)
            .map_err(|e| LumenError::EngineCall(format!("POST {} failed: {}", url, e)))?;
        Ok(())
    }

    fn get_string(&self, path: &str) -> Result<String> {
        let url = self.endpoint(path);
        let mut response = self
            .build_agent()
            .get(&url)
            .call()
            .map_err(|e| LumenError::EngineCall(format!("GET {} failed: {}", url, e)))?;
        response
            .body_mut()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_string()
            .map_err(|e| {
                LumenError::EngineCall(format!("Failed to read {} response: {}", url, e))
            })
    }
}

impl Engine for ForgeEngine {
    fn name(&self) -> &str {
        "forge"
    }

    fn configure(&mut self, options: &EngineOptions) -> Result<()> {
        let payload = forge_options_payload(options);
        tracing::info!(url = %self.api_url, %payload, "applying engine options");
        if let (Some(model), Some(inference)) =
            (options.model_memory_mb(), options.inference_memory_mb())
        {
            tracing::info!(model_mb = model, inference_mb = inference, "GPU memory split");
        }
        self.post_unit("options", &payload)
    }

    fn generate(&mut self, request: &GenerationRequest) -> Result<GenerationResult> {
        tracing::debug!(
            payload = %serde_json::to_string(request).unwrap_or_default(),
            "txt2img request"
        );
        let response: serde_json::Value = self.post_json("txt2img", request)?;
        parse_txt2img_response(response)
    }

    fn list_available_adapters(&mut self) -> Result<AdapterRegistry> {
        self.post_unit("refresh-loras", &serde_json::json!({}))?;
        let body = self.get_string("loras")?;
        parse_lora_list(&body)
    }

    fn load_adapters(&mut self, load: &AdapterLoad) -> Result<()> {
        // The web API activates networks from the prompt tags during txt2img
        tracing::debug!(names = ?load.names, "adapters will be activated by prompt tags");
        Ok(())
    }
}

/// Forge `/options` payload for the startup settings
pub fn forge_options_payload(options: &EngineOptions) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "forge_preset": options.preset,
        "forge_unet_storage_dtype": options.unet_storage_dtype,
        "forge_async_loading": if options.async_swap { "Async" } else { "Queue" },
        "forge_pin_shared_memory": if options.pin_shared_memory { "Shared" } else { "CPU" },
    });
    if let Some(checkpoint) = &options.checkpoint {
        payload["sd_model_checkpoint"] = serde_json::json!(checkpoint);
    }
    if let Some(inference_mb) = options.inference_memory_mb() {
        payload["forge_inference_memory"] = serde_json::json!(inference_mb);
    }
    payload
}

/// Convert a txt2img response into images and per-image seeds
pub fn parse_txt2img_response(response: serde_json::Value) -> Result<GenerationResult> {
    let parsed: Txt2ImgResponse = serde_json::from_value(response)
        .map_err(|e| LumenError::Decode(format!("Unexpected txt2img response: {}", e)))?;
    let info: Txt2ImgInfo = serde_json::from_str(&parsed.info)
        .map_err(|e| LumenError::Decode(format!("Invalid txt2img info: {}", e)))?;

    Ok(GenerationResult {
        images: parsed.images,
        per_image_seed: info.all_seeds,
    })
}

/// Parse the `/loras` listing into a registry
pub fn parse_lora_list(json: &str) -> Result<AdapterRegistry> {
    let entries: Vec<LoraEntry> = serde_json::from_str(json)
        .map_err(|e| LumenError::Decode(format!("Unexpected loras response: {}", e)))?;

    let mut registry = AdapterRegistry::new();
    for entry in entries {
        registry.insert(entry.name, entry.alias.as_deref());
    }
    Ok(registry)
}
