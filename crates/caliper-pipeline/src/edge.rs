//! Edge map for the reference detector: Canny followed by a one pixel
//! dilation so outlines stay closed around sharp corners.

use image::GrayImage;
use imageproc::distance_transform::Norm;

/// Floor for both hysteresis thresholds.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Binary edge map of `image`, 255 on edges.
///
/// Thresholds are clamped to `MIN_THRESHOLD..` and `low` to at most `high`.
#[must_use = "returns the binary edge map"]
pub fn closed_edges(image: &GrayImage, low: f32, high: f32) -> GrayImage {
    let high = high.max(MIN_THRESHOLD);
    let low = low.clamp(MIN_THRESHOLD, high);
    let edges = imageproc::edges::canny(image, low, high);
    imageproc::morphology::dilate(&edges, Norm::LInf, 1)
}
