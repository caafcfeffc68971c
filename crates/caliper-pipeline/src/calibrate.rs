//! Pixel scale from the rectified reference object.

use image::RgbImage;

use crate::catalog::ReferenceSpec;

/// Pixels per physical unit: the rectified reference width divided by
/// the reference's [calibration extent](ReferenceSpec::calibration_extent).
///
/// Returns `0.0` when there is no rectified image or the reference declares no
/// usable extent; callers treat a non-positive scale as a calibration
/// failure.
#[must_use]
pub fn pixel_scale(rectified: Option<&RgbImage>, spec: &ReferenceSpec) -> f64 {
    let Some(image) = rectified else {
        return 0.0;
    };
    match spec.calibration_extent() {
        Some(extent) => f64::from(image.width()) / extent,
        None => 0.0,
    }
}
