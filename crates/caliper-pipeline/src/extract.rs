//! Object outline extraction from the rectified image.
//!
//! The rectified image is converted to grayscale, thresholded with
//! Otsu's method (dark pixels become foreground), and the external
//! outline enclosing the largest area is kept.

use image::{GrayImage, Luma, RgbImage};

use crate::contour;
use crate::grayscale;
use crate::types::Polyline;

/// Inverse binary threshold at the Otsu level: pixels at or below the
/// level become 255, brighter pixels 0.
#[must_use = "returns the binary mask"]
pub fn inverse_otsu_threshold(gray: &GrayImage) -> GrayImage {
    let level = imageproc::contrast::otsu_level(gray);
    let mut mask = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel[0] <= level {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    mask
}

/// Largest external outline in the rectified image, or `None` when the
/// threshold leaves no foreground.
///
/// Outlines of equal area are ranked by point count, then by tracing
/// order.
#[must_use]
pub fn extract_object_outline(rectified: &RgbImage) -> Option<Polyline> {
    let gray = grayscale::to_grayscale(rectified);
    let mask = inverse_otsu_threshold(&gray);
    let outlines = contour::external_contours(&mask);

    let mut best: Option<(f64, Polyline)> = None;
    for outline in outlines {
        let area = outline.enclosed_area();
        let replace = best.as_ref().is_none_or(|(best_area, best_outline)| {
            area.total_cmp(best_area)
                .then(outline.len().cmp(&best_outline.len()))
                .is_gt()
        });
        if replace {
            best = Some((area, outline));
        }
    }
    best.map(|(_, outline)| outline)
}
