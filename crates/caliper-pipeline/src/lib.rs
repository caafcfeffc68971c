//! caliper-pipeline: Pure measurement pipeline (sans-IO).
//!
//! Measures an object in a photo against a reference object of known
//! physical size through:
//! decode -> preprocess blur -> reference detection -> rectification ->
//! scale calibration -> outline extraction -> dimension calculation.
//!
//! This crate has **no I/O dependencies** and does no logging -- it
//! operates on in-memory byte slices and returns structured data. Photo
//! lifecycle, persistence and notifications live in `caliper-service`.

pub mod blur;
pub mod calibrate;
pub mod catalog;
pub mod contour;
pub mod dimension;
pub mod edge;
pub mod extract;
pub mod grayscale;
pub mod rectify;
pub mod reference;
pub mod simplify;
pub mod types;

use serde::Serialize;

pub use catalog::{CatalogError, DetectionMethod, ReferenceCatalog, ReferenceSpec};
pub use dimension::{ConfidenceModel, ConfidenceScorer, ObjectDimensions};
pub use reference::{Detection, Quadrilateral};
pub use types::{
    BoundingBox, Dimensions, PipelineConfig, PipelineError, Point, Polyline, RgbImage,
};

/// Everything a successful run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureOutcome {
    /// Catalog name of the reference used for calibration.
    pub reference_type: String,
    /// `true` when the type was found by trying the catalog in order.
    pub auto_detected: bool,
    /// Bounds of the detected reference in the photo.
    pub reference_bbox: BoundingBox,
    /// Reference vertices in the photo, in tracing order.
    pub reference_corners: [Point; 4],
    /// Size of the rectified reference image.
    pub rectified_size: Dimensions,
    /// Pixels per physical unit.
    pub pixels_per_unit: f64,
    /// Vertex count of the measured outline.
    pub outline_points: usize,
    /// The measured object.
    pub dimensions: ObjectDimensions,
}

/// A failed run.
///
/// Carries the reference type detection settled on when the failure came
/// from a later stage, so callers can keep it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct MeasureError {
    /// Catalog name of the detected reference, if detection succeeded.
    pub detected_reference: Option<String>,
    #[source]
    pub error: PipelineError,
}

impl MeasureError {
    fn after_detection(reference_type: &str, error: PipelineError) -> Self {
        Self {
            detected_reference: Some(reference_type.to_owned()),
            error,
        }
    }

    /// Stage of the underlying error.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        self.error.stage()
    }
}

impl From<PipelineError> for MeasureError {
    fn from(error: PipelineError) -> Self {
        Self {
            detected_reference: None,
            error,
        }
    }
}

/// Run the full measurement pipeline on encoded image bytes.
///
/// With `reference` set, only that catalog type is tried; otherwise
/// types are tried in catalog order and the first detection wins.
///
/// # Pipeline steps
///
/// 1. Decode to RGB and apply the preprocessing blur
/// 2. Detect the reference quadrilateral and rectify it
/// 3. Derive pixels per unit from the rectified width
/// 4. Threshold the rectified image and keep the largest outline
/// 5. Fit a minimum-area rectangle and convert to physical units
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an invalid `config`,
/// [`PipelineError::EmptyInput`] or [`PipelineError::ImageDecode`] for
/// unusable bytes, and the errors of [`measure_image`] otherwise.
pub fn measure(
    image_bytes: &[u8],
    reference: Option<&str>,
    catalog: &ReferenceCatalog,
    config: &PipelineConfig,
) -> Result<MeasureOutcome, MeasureError> {
    config.validate()?;
    let image = grayscale::decode_and_preprocess(image_bytes, config.preprocess_sigma)?;
    measure_image(&image, reference, catalog, config)
}

/// Run steps 2 to 5 of [`measure`] on an already preprocessed image.
///
/// # Errors
///
/// Failures after detection carry the detected type in
/// [`MeasureError::detected_reference`].
///
/// - [`PipelineError::UnknownReference`] if `reference` is not in `catalog`
/// - [`PipelineError::ReferenceNotFound`] if no reference is detected
/// - [`PipelineError::UncalibratableScale`] if no positive scale can be
///   derived
/// - [`PipelineError::ContourNotFound`] if the rectified image has no
///   foreground outline
pub fn measure_image(
    image: &RgbImage,
    reference: Option<&str>,
    catalog: &ReferenceCatalog,
    config: &PipelineConfig,
) -> Result<MeasureOutcome, MeasureError> {
    let detection = match reference {
        Some(name) => reference::detect_reference(image, catalog, name, config)?,
        None => reference::auto_detect_reference(image, catalog, config)?,
    };
    let detected = detection.reference_type.as_str();
    let fail = |error| MeasureError::after_detection(detected, error);
    let spec = catalog
        .get(detected)
        .ok_or_else(|| fail(PipelineError::UnknownReference(detected.to_owned())))?;

    let pixels_per_unit = calibrate::pixel_scale(detection.rectified.as_ref(), spec);
    let rectified = match detection.rectified.as_ref() {
        Some(rectified) if pixels_per_unit > 0.0 => rectified,
        _ => return Err(fail(PipelineError::UncalibratableScale(spec.name.clone()))),
    };

    let outline = extract::extract_object_outline(rectified)
        .ok_or_else(|| fail(PipelineError::ContourNotFound))?;
    let dimensions = dimension::calculate_dimensions(&outline, pixels_per_unit, &config.confidence);

    Ok(MeasureOutcome {
        reference_type: detection.reference_type,
        auto_detected: reference.is_none(),
        reference_bbox: detection.quad.bbox,
        reference_corners: detection.quad.corners,
        rectified_size: Dimensions {
            width: rectified.width(),
            height: rectified.height(),
        },
        pixels_per_unit,
        outline_points: outline.len(),
        dimensions,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    fn fill(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, value: u8) {
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Rgb([value, value, value]));
            }
        }
    }

    /// A bright card with a dark chip, and a dark pen beside it, on a
    /// mid-gray table.
    fn card_photo() -> RgbImage {
        let mut img = RgbImage::from_pixel(640, 480, Rgb([90, 90, 90]));
        fill(&mut img, 120, 100, 420, 290, 230);
        fill(&mut img, 160, 150, 200, 180, 40);
        fill(&mut img, 480, 80, 490, 400, 20);
        img
    }

    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn measures_against_auto_detected_card() {
        let bytes = encode_png(&card_photo());
        let m = measure(
            &bytes,
            None,
            &ReferenceCatalog::default(),
            &PipelineConfig::default(),
        )
        .unwrap();

        assert_eq!(m.reference_type, "credit_card");
        assert!(m.auto_detected);
        assert!(
            (290..=315).contains(&m.rectified_size.width),
            "rectified width {}",
            m.rectified_size.width
        );
        let expected_scale = f64::from(m.rectified_size.width) / 8.56;
        assert!((m.pixels_per_unit - expected_scale).abs() < 1e-9);
        assert!(m.dimensions.length > 0.0);
        assert!(m.dimensions.width < m.dimensions.length);
        let area = m.dimensions.length * m.dimensions.width;
        assert!((m.dimensions.area - area).abs() < 1e-9);
        assert!((m.dimensions.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn declared_ruler_calibrates_on_length() {
        let m = measure_image(
            &card_photo(),
            Some("ruler"),
            &ReferenceCatalog::default(),
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(m.reference_type, "ruler");
        assert!(!m.auto_detected);
        let expected_scale = f64::from(m.rectified_size.width) / 30.0;
        assert!((m.pixels_per_unit - expected_scale).abs() < 1e-9);
    }

    #[test]
    fn reference_without_dimensions_cannot_calibrate() {
        let catalog = ReferenceCatalog::from_specs(vec![ReferenceSpec {
            name: "mystery".to_owned(),
            length: None,
            width: None,
            detection_method: DetectionMethod::EdgeDetection,
            confidence_threshold: 0.5,
        }])
        .unwrap();
        let config = PipelineConfig::default();
        let err = measure_image(&card_photo(), None, &catalog, &config).unwrap_err();
        assert_eq!(err.detected_reference.as_deref(), Some("mystery"));
        let expected = PipelineError::UncalibratableScale("mystery".to_owned());
        assert_eq!(err.error.to_string(), expected.to_string());
        assert_eq!(
            PipelineError::UncalibratableScale(String::new()).stage(),
            "scale calibration"
        );
    }

    #[test]
    fn blank_photo_fails_in_detection() {
        let bytes = encode_png(&RgbImage::from_pixel(320, 240, Rgb([128, 128, 128])));
        let err = measure(
            &bytes,
            None,
            &ReferenceCatalog::default(),
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.stage(), "reference detection");
        assert!(err.detected_reference.is_none());
    }

    #[test]
    fn round_object_is_not_a_reference() {
        let mut img = RgbImage::from_pixel(400, 400, Rgb([90, 90, 90]));
        for y in 0..400_u32 {
            for x in 0..400_u32 {
                let dx = f64::from(x) - 200.0;
                let dy = f64::from(y) - 200.0;
                if dx.hypot(dy) < 120.0 {
                    img.put_pixel(x, y, Rgb([230, 230, 230]));
                }
            }
        }
        let err = measure_image(
            &img,
            None,
            &ReferenceCatalog::default(),
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err.error, PipelineError::ReferenceNotFound));
    }

    #[test]
    fn empty_bytes_are_rejected() {
        let err = measure(
            &[],
            None,
            &ReferenceCatalog::default(),
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err.error, PipelineError::EmptyInput));
    }
}
