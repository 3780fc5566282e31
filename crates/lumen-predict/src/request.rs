//! Public prediction parameters and the engine's txt2img payload

use lumen_core::{LumenError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Name of the always-on face detailer script
pub const ADETAILER_SCRIPT: &str = "ADetailer";
/// Detection model handed to the face detailer
pub const ADETAILER_FACE_MODEL: &str = "face_yolov8n.pt";

/// Declares a closed set of engine strings as an enum. Parsing is the
/// input-boundary check; `as_str` returns the exact engine spelling.
macro_rules! string_choices {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn choices() -> Vec<String> {
                Self::ALL.iter().map(|c| c.as_str().to_string()).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LumenError;

            fn from_str(s: &str) -> Result<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|c| c.as_str() == s)
                    .ok_or_else(|| LumenError::InvalidChoice {
                        value: s.to_string(),
                        allowed: Self::choices(),
                    })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_choices! {
    /// Sampling method
    Sampler {
        FluxRealistic => "[Forge] Flux Realistic",
        Euler => "Euler",
        EulerA => "Euler a",
        DpmPp2m => "DPM++ 2M",
        DpmPpSde => "DPM++ SDE",
        DpmPp2mSde => "DPM++ 2M SDE",
        DpmPp2mSdeKarras => "DPM++ 2M SDE Karras",
        DpmPp2mSdeExponential => "DPM++ 2M SDE Exponential",
        DpmPp3mSde => "DPM++ 3M SDE",
        DpmPp3mSdeKarras => "DPM++ 3M SDE Karras",
        DpmPp3mSdeExponential => "DPM++ 3M SDE Exponential",
    }
}

string_choices! {
    /// Noise schedule type
    Scheduler {
        Simple => "Simple",
        Karras => "Karras",
        Exponential => "Exponential",
        SgmUniform => "SGM Uniform",
        SgmKarras => "SGM Karras",
        SgmExponential => "SGM Exponential",
        AlignYourSteps => "Align Your Steps",
        AlignYourSteps11 => "Align Your Steps 11",
        AlignYourSteps32 => "Align Your Steps 32",
        AlignYourStepsGits => "Align Your Steps GITS",
        KlOptimal => "KL Optimal",
        Normal => "Normal",
        Ddim => "DDIM",
        Beta => "Beta",
        Turbo => "Turbo",
    }
}

string_choices! {
    /// Upscaler for the hires. fix pass
    Upscaler {
        Latent => "Latent",
        LatentAntialiased => "Latent (antialiased)",
        LatentBicubic => "Latent (bicubic)",
        LatentBicubicAntialiased => "Latent (bicubic antialiased)",
        LatentNearest => "Latent (nearest)",
        LatentNearestExact => "Latent (nearest-exact)",
        None => "None",
        Lanczos => "Lanczos",
        Nearest => "Nearest",
        Esrgan4x => "ESRGAN_4x",
        Ldsr => "LDSR",
        RealEsrgan4xPlus => "R-ESRGAN 4x+",
        RealEsrgan4xPlusAnime6b => "R-ESRGAN 4x+ Anime6B",
        ScunetGan => "ScuNET GAN",
        ScunetPsnr => "ScuNET PSNR",
        SwinIr4x => "SwinIR 4x",
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Sampler::FluxRealistic
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::Simple
    }
}

impl Default for Upscaler {
    fn default() -> Self {
        Upscaler::Latent
    }
}

/// The parameters a caller may set on a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_num_outputs")]
    pub num_outputs: u32,
    #[serde(default)]
    pub sampler: Sampler,
    #[serde(default)]
    pub scheduler: Scheduler,
    #[serde(default = "default_steps")]
    pub num_inference_steps: u32,
    /// CFG scale; Flux checkpoints want 1.0
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default = "default_distilled_guidance_scale")]
    pub distilled_guidance_scale: f64,
    /// -1 lets the engine pick
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default)]
    pub enable_hr: bool,
    #[serde(default)]
    pub hr_upscaler: Upscaler,
    #[serde(default = "default_steps")]
    pub hr_steps: u32,
    #[serde(default = "default_hr_scale")]
    pub hr_scale: f64,
    /// Only sent to the engine when `enable_hr` is set
    #[serde(default = "default_denoising_strength")]
    pub denoising_strength: f64,
    #[serde(default)]
    pub enable_adetailer: bool,
    /// Comma-separated adapter URLs
    #[serde(default)]
    pub lora_urls: String,
    /// Comma-separated adapter weights, matched to `lora_urls` by position
    #[serde(default)]
    pub lora_weights: String,
}

fn default_width() -> u32 {
    512
}
fn default_height() -> u32 {
    768
}
fn default_num_outputs() -> u32 {
    1
}
fn default_steps() -> u32 {
    20
}
fn default_guidance_scale() -> f64 {
    1.0
}
fn default_distilled_guidance_scale() -> f64 {
    3.5
}
fn default_seed() -> i64 {
    -1
}
fn default_hr_scale() -> f64 {
    2.0
}
fn default_denoising_strength() -> f64 {
    0.5
}

impl PredictionInput {
    /// A prediction for `prompt` with every other parameter at its default
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: String::new(),
            width: default_width(),
            height: default_height(),
            num_outputs: default_num_outputs(),
            sampler: Sampler::default(),
            scheduler: Scheduler::default(),
            num_inference_steps: default_steps(),
            guidance_scale: default_guidance_scale(),
            distilled_guidance_scale: default_distilled_guidance_scale(),
            seed: default_seed(),
            enable_hr: false,
            hr_upscaler: Upscaler::default(),
            hr_steps: default_steps(),
            hr_scale: default_hr_scale(),
            denoising_strength: default_denoising_strength(),
            enable_adetailer: false,
            lora_urls: String::new(),
            lora_weights: String::new(),
        }
    }

    /// Reject out-of-range numbers before any work is done
    pub fn validate(&self) -> Result<()> {
        check_range("width", self.width as f64, 1.0, 1024.0)?;
        check_range("height", self.height as f64, 1.0, 1024.0)?;
        check_range("num_outputs", self.num_outputs as f64, 1.0, 4.0)?;
        check_range("num_inference_steps", self.num_inference_steps as f64, 1.0, 100.0)?;
        check_range("guidance_scale", self.guidance_scale, 1.0, 50.0)?;
        check_range("distilled_guidance_scale", self.distilled_guidance_scale, 0.0, 30.0)?;
        check_range("hr_steps", self.hr_steps as f64, 0.0, 100.0)?;
        check_range("hr_scale", self.hr_scale, 1.0, 4.0)?;
        check_range("denoising_strength", self.denoising_strength, 0.0, 1.0)?;
        Ok(())
    }
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    // NaN fails `contains`, so it is rejected too
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(LumenError::ValueOutOfRange {
            field: field.to_string(),
            min,
            max,
            value,
        })
    }
}

/// Arguments for one always-on script
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptArgs {
    pub args: Vec<serde_json::Value>,
}

/// The engine's native txt2img payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub batch_size: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub seed: i64,
    pub do_not_save_samples: bool,
    pub sampler_name: String,
    pub scheduler: String,
    pub enable_hr: bool,
    pub hr_upscaler: String,
    pub hr_second_pass_steps: u32,
    /// Serialized as `null` when hires. fix is off
    pub denoising_strength: Option<f64>,
    pub hr_scale: f64,
    pub distilled_cfg_scale: f64,
    pub hr_additional_modules: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alwayson_scripts: Option<BTreeMap<String, ScriptArgs>>,
}

/// Map public parameters and the (adapter-augmented) prompt to the engine
/// payload. Pure: identical inputs give identical requests.
pub fn build_request(input: &PredictionInput, prompt: impl Into<String>) -> GenerationRequest {
    let alwayson_scripts = if input.enable_adetailer {
        let mut scripts = BTreeMap::new();
        scripts.insert(
            ADETAILER_SCRIPT.to_string(),
            ScriptArgs {
                args: vec![serde_json::json!({ "ad_model": ADETAILER_FACE_MODEL })],
            },
        );
        Some(scripts)
    } else {
        None
    };

    GenerationRequest {
        prompt: prompt.into(),
        negative_prompt: input.negative_prompt.clone(),
        width: input.width,
        height: input.height,
        batch_size: input.num_outputs,
        steps: input.num_inference_steps,
        cfg_scale: input.guidance_scale,
        seed: input.seed,
        do_not_save_samples: true,
        sampler_name: input.sampler.as_str().to_string(),
        scheduler: input.scheduler.as_str().to_string(),
        enable_hr: input.enable_hr,
        hr_upscaler: input.hr_upscaler.as_str().to_string(),
        hr_second_pass_steps: input.hr_steps,
        denoising_strength: input.enable_hr.then_some(input.denoising_strength),
        hr_scale: input.hr_scale,
        distilled_cfg_scale: input.distilled_guidance_scale,
        hr_additional_modules: Vec::new(),
        alwayson_scripts,
    }
}
