//! Layered configuration system
//!
//! Config is loaded with three layers of precedence (highest wins):
//! 1. Environment variables: `LUMEN_*`
//! 2. Project-local: `.lumen/config.toml`
//! 3. Global: `~/.lumen/config.toml`
//!
//! File layers are merged key by key, so a project file only needs the
//! keys it changes.

use crate::engine::EngineOptions;
use lumen_asset::{AssetKind, CommandFetcher, Fetch, HttpFetcher, RemoteAsset};
use lumen_core::{LumenError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_FORGE_ROOT: &str = "/stable-diffusion-webui-forge-main";
const DEFAULT_BASE_MODEL_URL: &str =
    "https://civitai.com/api/download/models/819165?type=Model&format=SafeTensor&size=full&fp=nf4";
const DEFAULT_BASE_MODEL_FILE: &str = "flux1DevHyperNF4Flux1DevBNB_flux1DevHyperNF4.safetensors";

/// On-disk layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_forge_root")]
    pub forge_root: PathBuf,
    /// Checkpoint directory; defaults to `{forge_root}/models/Stable-diffusion`
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
    /// Adapter directory; defaults to `{forge_root}/models/Lora`
    #[serde(default)]
    pub lora_dir: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_forge_root() -> PathBuf {
    PathBuf::from(DEFAULT_FORGE_ROOT)
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            forge_root: default_forge_root(),
            models_dir: None,
            lora_dir: None,
            output_dir: default_output_dir(),
        }
    }
}

impl PathsConfig {
    pub fn models_dir(&self) -> PathBuf {
        self.models_dir
            .clone()
            .unwrap_or_else(|| self.forge_root.join("models").join("Stable-diffusion"))
    }

    pub fn lora_dir(&self) -> PathBuf {
        self.lora_dir
            .clone()
            .unwrap_or_else(|| self.forge_root.join("models").join("Lora"))
    }
}

/// Where the base checkpoint comes from and what it is called locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseModelConfig {
    #[serde(default = "default_base_model_url")]
    pub url: String,
    #[serde(default = "default_base_model_file")]
    pub file_name: String,
}

fn default_base_model_url() -> String {
    DEFAULT_BASE_MODEL_URL.to_string()
}
fn default_base_model_file() -> String {
    DEFAULT_BASE_MODEL_FILE.to_string()
}

impl Default for BaseModelConfig {
    fn default() -> Self {
        Self {
            url: default_base_model_url(),
            file_name: default_base_model_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `forge` or `mock`
    #[serde(default = "default_engine_kind")]
    pub kind: String,
    #[serde(default = "default_engine_url")]
    pub api_url: String,
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub options: EngineOptions,
}

fn default_engine_kind() -> String {
    "forge".to_string()
}
fn default_engine_url() -> String {
    "http://127.0.0.1:7860".to_string()
}
fn default_engine_timeout() -> u64 {
    600
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: default_engine_kind(),
            api_url: default_engine_url(),
            timeout_secs: default_engine_timeout(),
            options: EngineOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// `http` (built-in) or `command` (external program)
    #[serde(default = "default_fetcher_kind")]
    pub kind: String,
    /// Program used by the `command` fetcher
    #[serde(default = "default_fetch_program")]
    pub program: String,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

fn default_fetcher_kind() -> String {
    "http".to_string()
}
fn default_fetch_program() -> String {
    "pget".to_string()
}
fn default_fetch_timeout() -> u64 {
    3600
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            kind: default_fetcher_kind(),
            program: default_fetch_program(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

/// Resolved configuration with environment variable overrides applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LumenConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub base_model: BaseModelConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

impl LumenConfig {
    /// Load config with layered precedence: global < project < env vars
    pub fn load() -> Result<Self> {
        let mut merged = toml::Table::new();

        // Layer 1: Global config (~/.lumen/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                merge_tables(&mut merged, Self::load_table(&global_path)?);
            }
        }

        // Layer 2: Project-local config (.lumen/config.toml)
        let local_path = PathBuf::from(".lumen/config.toml");
        if local_path.exists() {
            merge_tables(&mut merged, Self::load_table(&local_path)?);
        }

        let mut config = Self::from_table(merged)?;

        // Layer 3: Environment variable overrides
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from a specific file path only, plus env overrides
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::from_table(Self::load_table(path)?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn base_model_path(&self) -> PathBuf {
        self.paths.models_dir().join(&self.base_model.file_name)
    }

    pub fn base_model_asset(&self) -> RemoteAsset {
        RemoteAsset::new(
            self.base_model.url.clone(),
            self.base_model_path(),
            AssetKind::BaseModel,
        )
    }

    /// Engine options with the checkpoint defaulted to the base model
    pub fn engine_options(&self) -> EngineOptions {
        let mut options = self.engine.options.clone();
        if options.checkpoint.is_none() {
            options.checkpoint = Some(self.base_model.file_name.clone());
        }
        options
    }

    /// Build the download transport named in `[fetcher]`
    pub fn fetcher(&self) -> Result<Box<dyn Fetch>> {
        match self.fetcher.kind.as_str() {
            "http" => Ok(Box::new(HttpFetcher::with_timeout(Duration::from_secs(
                self.fetcher.timeout_secs,
            )))),
            "command" => Ok(Box::new(CommandFetcher::new(self.fetcher.program.clone()))),
            other => Err(LumenError::Config(format!(
                "Unknown fetcher '{}'. Available: http, command",
                other
            ))),
        }
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".lumen").join("config.toml"))
    }

    fn load_table(path: &Path) -> Result<toml::Table> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str::<toml::Table>(&content).map_err(|e| {
            LumenError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    fn from_table(table: toml::Table) -> Result<Self> {
        Ok(toml::Value::Table(table).try_into::<Self>()?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LUMEN_ENGINE") {
            self.engine.kind = v;
        }
        if let Ok(v) = std::env::var("LUMEN_ENGINE_URL") {
            self.engine.api_url = v;
        }
        if let Ok(v) = std::env::var("LUMEN_FORGE_ROOT") {
            self.paths.forge_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LUMEN_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LUMEN_BASE_MODEL_URL") {
            self.base_model.url = v;
        }
        if let Ok(v) = std::env::var("LUMEN_FETCHER") {
            self.fetcher.kind = v;
        }
    }
}

/// Recursively overlay `overlay` onto `base`; tables merge, values replace
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
