//! Writes engine output images to disk

use crate::engine::GenerationResult;
use base64::{engine::general_purpose, Engine as _};
use lumen_core::{LumenError, Result};
use std::path::PathBuf;

/// A generated image on disk and the seed it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputImage {
    pub path: PathBuf,
    pub seed: i64,
}

/// Turns a [`GenerationResult`] into PNG files
pub struct Materializer {
    output_dir: PathBuf,
}

impl Materializer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Decode every image and save it as `{seed}-{uuid}.png`.
    ///
    /// Handles come back in the order of `result.images`. A single bad
    /// image fails the whole call; files already written stay on disk.
    pub fn materialize(&self, result: GenerationResult) -> Result<Vec<OutputImage>> {
        std::fs::create_dir_all(&self.output_dir)?;

        let mut outputs = Vec::with_capacity(result.images.len());
        for (i, encoded) in result.images.iter().enumerate() {
            let seed = *result.per_image_seed.get(i).ok_or_else(|| {
                LumenError::Decode(format!(
                    "no seed for image {} ({} seeds for {} images)",
                    i,
                    result.per_image_seed.len(),
                    result.images.len()
                ))
            })?;

            let bytes = general_purpose::STANDARD
                .decode(strip_data_uri(encoded))
                .map_err(|e| {
                    LumenError::Decode(format!("image {} is not valid base64: {}", i, e))
                })?;
            let img = image::load_from_memory(&bytes).map_err(|e| {
                LumenError::Decode(format!("image {} is not a readable image: {}", i, e))
            })?;

            let path = self.output_dir.join(output_file_name(seed));
            img.save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| match e {
                    image::ImageError::IoError(io) => LumenError::Io(io),
                    other => LumenError::Decode(format!(
                        "failed to write {}: {}",
                        path.display(),
                        other
                    )),
                })?;

            tracing::info!(path = %path.display(), seed, "saved image");
            outputs.push(OutputImage { path, seed });
        }
        Ok(outputs)
    }
}

/// `{seed}-{uuid}.png`; unique even when seeds repeat
pub fn output_file_name(seed: i64) -> String {
    format!("{}-{}.png", seed, uuid::Uuid::new_v4())
}

fn strip_data_uri(encoded: &str) -> &str {
    match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    }
}
