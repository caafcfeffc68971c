//! Image decoding, preprocessing and grayscale conversion.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the
//! lightly blurred colour image every later stage works from, plus the
//! single-channel conversions the detector and extractor need.

use image::{GrayImage, RgbImage};

use crate::blur;
use crate::types::PipelineError;

/// Decode raw image bytes into an RGB image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

/// Decode and apply the noise-reducing blur that precedes detection.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_and_preprocess(bytes: &[u8], sigma: f32) -> Result<RgbImage, PipelineError> {
    let rgb = decode(bytes)?;
    Ok(blur::gaussian_blur_rgb(&rgb, sigma))
}

/// Convert an RGB image to grayscale.
///
/// Uses `image`'s weighted luminance conversion.
#[must_use = "returns the grayscale image"]
pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}
