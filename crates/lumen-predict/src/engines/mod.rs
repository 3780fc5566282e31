//! Engine registry
//!
//! Maps engine names to concrete implementations.

pub mod forge;
pub mod mock;

use crate::config::LumenConfig;
use crate::engine::Engine;
use lumen_core::{LumenError, Result};

/// Create an engine by name with configuration
pub fn create_engine(name: &str, config: &LumenConfig) -> Result<Box<dyn Engine>> {
    match name {
        "mock" => Ok(Box::new(mock::MockEngine::scanning(config.paths.lora_dir()))),
        "forge" => Ok(Box::new(forge::ForgeEngine::from_config(config)?)),
        _ => Err(LumenError::Config(format!(
            "Unknown engine '{}'. Available: {}",
            name,
            available_engines().join(", ")
        ))),
    }
}

/// List all available engine names
pub fn available_engines() -> Vec<&'static str> {
    vec!["forge", "mock"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_known_engines() {
        let config = LumenConfig::default();
        for name in available_engines() {
            assert_eq!(create_engine(name, &config).unwrap().name(), name);
        }
    }

    #[test]
    fn test_unknown_engine() {
        let err = create_engine("comfy", &LumenConfig::default()).err().unwrap();
        assert!(err.to_string().contains("Available: forge, mock"));
    }
}
