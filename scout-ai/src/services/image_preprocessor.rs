//! Image normalization for transmission
//!
//! Turns arbitrary uploaded or on-disk images into a bounded list of
//! opaque true-color JPEGs no larger than a configured bound.
//!
//! **Per image:**
//! 1. Decode (format sniffed from content, not extension)
//! 2. Composite any alpha channel onto opaque white, convert to RGB8
//! 3. Downscale with Lanczos3 so the longest side fits `max_dimension` (never upscale)
//! 4. Encode as JPEG
//!
//! Decode failures skip the image with a warning; the batch continues.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use scout_common::config::ImageConfig;
use std::borrow::Cow;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

const JPEG_QUALITY: u8 = 90;

/// Image preprocessing errors (per image, never batch-fatal)
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to read {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Failed to decode {0}: {1}")]
    Decode(String, image::ImageError),

    #[error("Failed to encode {0}: {1}")]
    Encode(String, image::ImageError),
}

/// Raw image handed to the preprocessor
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Image file on disk
    Path(PathBuf),
    /// In-memory blob (upload), with a display name for logging
    Bytes { name: String, data: Vec<u8> },
}

impl ImageInput {
    /// Name used in logs and diagnostics
    pub fn name(&self) -> String {
        match self {
            ImageInput::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            ImageInput::Bytes { name, .. } => name.clone(),
        }
    }

    fn bytes(&self) -> Result<Cow<'_, [u8]>, PreprocessError> {
        match self {
            ImageInput::Path(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|e| PreprocessError::Read(self.name(), e)),
            ImageInput::Bytes { data, .. } => Ok(Cow::Borrowed(data.as_slice())),
        }
    }

    fn is_heif(&self) -> bool {
        let name = self.name().to_lowercase();
        name.ends_with(".heic") || name.ends_with(".heif")
    }
}

/// Count and size limits applied by the preprocessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub max_images: usize,
    pub max_dimension: u32,
}

impl PreprocessOptions {
    /// Folder-batch limits
    pub fn batch(config: &ImageConfig) -> Self {
        Self {
            max_images: config.max_images,
            max_dimension: config.max_dimension,
        }
    }

    /// Interactive (single submission) limits
    pub fn interactive(config: &ImageConfig) -> Self {
        Self {
            max_images: config.interactive_max_images,
            max_dimension: config.interactive_max_dimension,
        }
    }
}

/// Image ready to be sent as an inline part
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    /// Source name (file name or upload name)
    pub source: String,
    pub width: u32,
    pub height: u32,
    /// JPEG bytes
    pub data: Vec<u8>,
}

impl NormalizedImage {
    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Normalize up to `options.max_images` inputs, skipping undecodable ones
pub fn preprocess_images(inputs: &[ImageInput], options: PreprocessOptions) -> Vec<NormalizedImage> {
    if inputs.len() > options.max_images {
        debug!(
            supplied = inputs.len(),
            max_images = options.max_images,
            "Truncating image list"
        );
    }

    let mut normalized = Vec::new();
    for input in inputs.iter().take(options.max_images) {
        match preprocess_image(input, options.max_dimension) {
            Ok(image) => normalized.push(image),
            Err(e) => {
                warn!(image = %input.name(), error = %e, "Skipping unreadable image");
                if input.is_heif() {
                    warn!(
                        image = %input.name(),
                        "HEIC/HEIF decoding is not available in this build; convert to JPEG first"
                    );
                }
            }
        }
    }

    normalized
}

pub fn preprocess_image(input: &ImageInput, max_dimension: u32) -> Result<NormalizedImage, PreprocessError> {
    let name = input.name();
    let bytes = input.bytes()?;
    let decoded =
        image::load_from_memory(&bytes).map_err(|e| PreprocessError::Decode(name.clone(), e))?;

    let rgb = normalize_image(decoded, max_dimension);
    let (width, height) = rgb.dimensions();

    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| PreprocessError::Encode(name.clone(), e))?;

    debug!(image = %name, width, height, bytes = data.len(), "Normalized image");

    Ok(NormalizedImage {
        source: name,
        width,
        height,
        data,
    })
}

/// Flatten to opaque RGB and downscale to fit `max_dimension`
pub fn normalize_image(image: DynamicImage, max_dimension: u32) -> RgbImage {
    let rgb = flatten_onto_white(&image);
    let (width, height) = rgb.dimensions();

    match fit_within(width, height, max_dimension) {
        Some((new_width, new_height)) => {
            imageops::resize(&rgb, new_width, new_height, FilterType::Lanczos3)
        }
        None => rgb,
    }
}

/// Composite transparent pixels over white; opaque images are converted directly
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u32::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            ((u32::from(channel) * alpha + 255 * (255 - alpha) + 127) / 255) as u8
        };
        out.put_pixel(x, y, image::Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }

    out
}

/// Target size preserving aspect ratio, or None when already within bounds
fn fit_within(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if width <= max_dimension && height <= max_dimension {
        return None;
    }

    let scale = f64::from(max_dimension) / f64::from(width.max(height));
    let new_width = ((f64::from(width) * scale).round() as u32).clamp(1, max_dimension);
    let new_height = ((f64::from(height) * scale).round() as u32).clamp(1, max_dimension);
    Some((new_width, new_height))
}
