//! Contour tracing: extract closed outlines from a binary image.
//!
//! Both the reference detector (on a Canny edge map) and the object
//! extractor (on an Otsu-thresholded mask) only care about *external*
//! borders: outlines that are not nested inside another region. Holes and
//! everything inside them are discarded.

use image::GrayImage;
use imageproc::contours::BorderType;

use crate::types::{Point, Polyline};

/// Trace the outermost borders of the white regions in `binary`.
///
/// Uses Suzuki-Abe border following via
/// `imageproc::contours::find_contours` and keeps only outer borders
/// without a parent, i.e. the contours a "retrieve external" mode would
/// report. Integer grid coordinates become floating-point [`Point`]s.
#[must_use = "returns the traced outlines"]
pub fn external_contours(binary: &GrayImage) -> Vec<Polyline> {
    let contours: Vec<imageproc::contours::Contour<i32>> =
        imageproc::contours::find_contours(binary);

    contours
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| {
            let points = c
                .points
                .into_iter()
                .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                .collect();
            Polyline::new(points)
        })
        .collect()
}

/// Sort outlines by enclosed area, largest first.
///
/// Stable, so outlines of equal area keep their tracing order.
pub fn sort_by_area_desc(outlines: &mut [Polyline]) {
    outlines.sort_by(|a, b| b.enclosed_area().total_cmp(&a.enclosed_area()));
}
