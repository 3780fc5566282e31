//! Adapter registry listing

use anyhow::Result;
use lumen_predict::{LumenConfig, Predictor};

pub fn run(config: LumenConfig, engine: Option<&str>) -> Result<()> {
    let mut predictor = Predictor::from_config(config, engine)?;
    let registry = predictor.list_adapters()?;

    if registry.is_empty() {
        println!("No adapters registered with engine '{}'.", predictor.engine_name());
        return Ok(());
    }

    println!("{} adapter(s):\n", registry.len());
    for name in registry.names() {
        println!("  {}", name);
    }
    Ok(())
}
