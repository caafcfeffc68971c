//! Reference-object detection.
//!
//! The photo is reduced to a Canny edge map, external outlines are
//! ranked by enclosed area, and the first one that simplifies to four
//! vertices with a large enough bounding box is taken as the reference.
//! Its region is then rectified so the calibrator can read its width.

use std::cell::OnceCell;

use image::RgbImage;

use crate::blur;
use crate::catalog::{DetectionMethod, ReferenceCatalog, ReferenceSpec};
use crate::contour;
use crate::edge;
use crate::grayscale;
use crate::rectify;
use crate::simplify;
use crate::types::{BoundingBox, PipelineConfig, PipelineError, Point, Polyline};

/// A four-sided outline found in the photo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrilateral {
    /// Vertices in tracing order.
    pub corners: [Point; 4],
    /// Axis-aligned bounds of the vertices.
    pub bbox: BoundingBox,
}

/// A located reference object.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Catalog name of the reference type.
    pub reference_type: String,
    /// Where the reference was found.
    pub quad: Quadrilateral,
    /// The reference region warped to an axis-aligned rectangle, `None`
    /// when its corners admit no projective transform.
    pub rectified: Option<RgbImage>,
}

/// Find the largest qualifying quadrilateral in `image`.
#[must_use]
pub fn find_quadrilateral(image: &RgbImage, config: &PipelineConfig) -> Option<Quadrilateral> {
    let gray = grayscale::to_grayscale(image);
    let blurred = blur::gaussian_blur(&gray, config.detect_sigma);
    let edges = edge::closed_edges(&blurred, config.canny_low, config.canny_high);

    let mut outlines = contour::external_contours(&edges);
    contour::sort_by_area_desc(&mut outlines);
    outlines
        .iter()
        .find_map(|outline| as_quadrilateral(outline, config))
}

fn as_quadrilateral(outline: &Polyline, config: &PipelineConfig) -> Option<Quadrilateral> {
    let tolerance = config.approx_epsilon * outline.closed_length();
    let approx = simplify::approximate_closed(outline, tolerance);
    let &[a, b, c, d] = approx.points() else {
        return None;
    };
    let bbox = approx.bounding_box()?;
    let min = config.min_reference_side;
    (bbox.width >= min && bbox.height >= min).then_some(Quadrilateral {
        corners: [a, b, c, d],
        bbox,
    })
}

fn locate(
    image: &RgbImage,
    config: &PipelineConfig,
    method: DetectionMethod,
) -> Option<Quadrilateral> {
    match method {
        DetectionMethod::EdgeDetection | DetectionMethod::TemplateMatching => {
            find_quadrilateral(image, config)
        }
    }
}

fn detection(image: &RgbImage, spec: &ReferenceSpec, quad: Quadrilateral) -> Detection {
    Detection {
        reference_type: spec.name.clone(),
        quad,
        rectified: rectify::rectify(image, quad.corners),
    }
}

/// Detect the reference object of a declared type.
///
/// # Errors
///
/// Returns [`PipelineError::UnknownReference`] if `reference_type` is not
/// in `catalog`, and [`PipelineError::ReferenceNotFound`] if no
/// qualifying quadrilateral exists.
pub fn detect_reference(
    image: &RgbImage,
    catalog: &ReferenceCatalog,
    reference_type: &str,
    config: &PipelineConfig,
) -> Result<Detection, PipelineError> {
    let spec = catalog
        .get(reference_type)
        .ok_or_else(|| PipelineError::UnknownReference(reference_type.to_owned()))?;
    let quad = locate(image, config, spec.detection_method)
        .ok_or(PipelineError::ReferenceNotFound)?;
    Ok(detection(image, spec, quad))
}

/// Try every catalog type in declaration order and return the first hit.
///
/// Types sharing a detection method share one search, so the photo is
/// scanned at most once per method.
///
/// # Errors
///
/// Returns [`PipelineError::ReferenceNotFound`] if no type matches.
pub fn auto_detect_reference(
    image: &RgbImage,
    catalog: &ReferenceCatalog,
    config: &PipelineConfig,
) -> Result<Detection, PipelineError> {
    let edge_search = OnceCell::new();
    catalog
        .iter()
        .find_map(|spec| {
            let quad = match spec.detection_method {
                DetectionMethod::EdgeDetection | DetectionMethod::TemplateMatching => {
                    *edge_search.get_or_init(|| locate(image, config, spec.detection_method))
                }
            }?;
            Some(detection(image, spec, quad))
        })
        .ok_or(PipelineError::ReferenceNotFound)
}
