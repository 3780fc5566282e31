//! One-time engine preparation

use anyhow::Result;
use lumen_asset::FetchOutcome;
use lumen_predict::{LumenConfig, Predictor};

pub fn run(config: LumenConfig, engine: Option<&str>) -> Result<()> {
    let model_path = config.base_model_path();
    let mut predictor = Predictor::from_config(config, engine)?;

    match predictor.setup()? {
        FetchOutcome::Cached => println!("Base model already present: {}", model_path.display()),
        FetchOutcome::Fetched { elapsed, hash } => {
            println!("Downloaded base model: {}", model_path.display());
            if let Some(hash) = hash {
                println!("  Hash: {}", hash.to_prefixed_hex());
            }
            println!("  Done in {:.1}s", elapsed.as_secs_f64());
        }
    }
    println!("Engine '{}' configured.", predictor.engine_name());
    Ok(())
}
