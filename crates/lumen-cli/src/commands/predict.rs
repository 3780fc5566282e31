//! Image generation command

use anyhow::Result;
use clap::Args;
use lumen_predict::{LumenConfig, PredictionInput, Predictor, Sampler, Scheduler, Upscaler};
use std::path::PathBuf;

#[derive(Args)]
pub struct PredictArgs {
    /// Text prompt
    #[arg(long, short)]
    pub prompt: String,

    /// Things to keep out of the image
    #[arg(long, default_value = "")]
    pub negative_prompt: String,

    /// Image width in pixels
    #[arg(long, default_value = "512")]
    pub width: u32,

    /// Image height in pixels
    #[arg(long, default_value = "768")]
    pub height: u32,

    /// Images per batch (1-4)
    #[arg(long, short = 'n', default_value = "1")]
    pub num_outputs: u32,

    /// Sampling method
    #[arg(long, default_value_t = Sampler::default())]
    pub sampler: Sampler,

    /// Noise schedule
    #[arg(long, default_value_t = Scheduler::default())]
    pub scheduler: Scheduler,

    /// Denoising steps
    #[arg(long, default_value = "20")]
    pub steps: u32,

    /// CFG scale
    #[arg(long, default_value = "1.0")]
    pub guidance_scale: f64,

    /// Flux distilled guidance
    #[arg(long, default_value = "3.5")]
    pub distilled_guidance_scale: f64,

    /// Random seed; -1 lets the engine pick
    #[arg(long, default_value = "-1", allow_negative_numbers = true)]
    pub seed: i64,

    /// Run a hires. fix second pass
    #[arg(long)]
    pub enable_hr: bool,

    /// Upscaler for the hires. fix pass
    #[arg(long, default_value_t = Upscaler::default())]
    pub hr_upscaler: Upscaler,

    /// Steps for the hires. fix pass
    #[arg(long, default_value = "20")]
    pub hr_steps: u32,

    /// Upscale factor for the hires. fix pass
    #[arg(long, default_value = "2.0")]
    pub hr_scale: f64,

    /// Denoising strength for the hires. fix pass
    #[arg(long, default_value = "0.5")]
    pub denoising_strength: f64,

    /// Run ADetailer face restoration
    #[arg(long)]
    pub enable_adetailer: bool,

    /// Comma-separated LoRA URLs
    #[arg(long, default_value = "")]
    pub lora_urls: String,

    /// Comma-separated LoRA weights (default 0.7 each)
    #[arg(long, default_value = "")]
    pub lora_weights: String,

    /// Directory for the generated PNGs (overrides [paths] output_dir)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl PredictArgs {
    fn to_input(&self) -> PredictionInput {
        PredictionInput {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            width: self.width,
            height: self.height,
            num_outputs: self.num_outputs,
            sampler: self.sampler,
            scheduler: self.scheduler,
            num_inference_steps: self.steps,
            guidance_scale: self.guidance_scale,
            distilled_guidance_scale: self.distilled_guidance_scale,
            seed: self.seed,
            enable_hr: self.enable_hr,
            hr_upscaler: self.hr_upscaler,
            hr_steps: self.hr_steps,
            hr_scale: self.hr_scale,
            denoising_strength: self.denoising_strength,
            enable_adetailer: self.enable_adetailer,
            lora_urls: self.lora_urls.clone(),
            lora_weights: self.lora_weights.clone(),
        }
    }
}

pub fn run(mut config: LumenConfig, engine: Option<&str>, args: PredictArgs) -> Result<()> {
    if let Some(dir) = &args.output {
        config.paths.output_dir = dir.clone();
    }
    let input = args.to_input();
    let mut predictor = Predictor::from_config(config, engine)?;
    predictor.require_base_model()?;

    println!(
        "Generating {} image(s) with '{}'...",
        input.num_outputs,
        predictor.engine_name()
    );
    let outputs = predictor.predict(&input)?;

    for output in &outputs {
        println!("  {} (seed {})", output.path.display(), output.seed);
    }
    Ok(())
}
