//! Lumen Predict - Prediction adapter for a Forge text-to-image engine
//!
//! Turns a [`PredictionInput`] into images on disk:
//!
//! 1. style adapters named by URL are downloaded into the engine's adapter
//!    folder, checked against the engine registry and appended to the prompt
//!    as `<lora:name:weight>` tags ([`lora`]);
//! 2. the public parameters are mapped to the engine's txt2img payload
//!    ([`request`]);
//! 3. the engine renders the batch ([`engine`], [`engines`]);
//! 4. the returned base64 images are written out as PNG files named after
//!    their seeds ([`materialize`]).
//!
//! [`Predictor`] ties these together with the asset cache from `lumen-asset`
//! and the layered [`LumenConfig`].

pub mod config;
pub mod engine;
pub mod engines;
pub mod lora;
pub mod materialize;
pub mod predictor;
pub mod request;

pub use config::LumenConfig;
pub use engine::{AdapterLoad, AdapterRegistry, Engine, EngineOptions, GenerationResult};
pub use engines::{available_engines, create_engine};
pub use lora::{AdapterResolver, Resolution, ResolvedAdapter};
pub use materialize::{Materializer, OutputImage};
pub use predictor::Predictor;
pub use request::{build_request, GenerationRequest, PredictionInput, Sampler, Scheduler, Upscaler};
