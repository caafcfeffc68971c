//! Shared types for the caliper measurement pipeline.

use geo::Area;
use serde::{Deserialize, Serialize};

use crate::dimension::ConfidenceModel;

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage`: the preprocessed photo and every rectified
/// image are three-channel colour rasters.
pub use image::RgbImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Single-precision pair, the control point format `imageproc` expects.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_f32_pair(self) -> (f32, f32) {
        (self.x as f32, self.y as f32)
    }
}

impl From<Point> for geo::Coord<f64> {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<geo::Coord<f64>> for Point {
    fn from(c: geo::Coord<f64>) -> Self {
        Self::new(c.x, c.y)
    }
}

/// A sequence of connected points. Outlines produced by contour tracing
/// are closed: the last point connects back to the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the polyline and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// Perimeter of the closed outline, including the closing segment.
    #[must_use]
    pub fn closed_length(&self) -> f64 {
        let n = self.0.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| self.0[i].distance(self.0[(i + 1) % n]))
            .sum()
    }

    /// Area enclosed by the closed outline (shoelace, orientation-independent).
    #[must_use]
    pub fn enclosed_area(&self) -> f64 {
        if self.0.len() < 3 {
            return 0.0;
        }
        let ring: Vec<geo::Coord<f64>> = self.0.iter().copied().map(Into::into).collect();
        geo::Polygon::new(geo::LineString::from(ring), vec![]).unsigned_area()
    }

    /// Axis-aligned bounding box, `None` for an empty polyline.
    ///
    /// Width and height count pixels inclusively, so a single point has a
    /// 1x1 box.
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = self.0.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.0[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1.0,
            height: max_y - min_y + 1.0,
        })
    }
}

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Tunable parameters of the measurement pipeline.
///
/// Defaults mirror the thresholds the measurement service has always
/// shipped with. Every field is optional in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gaussian sigma applied to the decoded colour photo before any
    /// detection (roughly a 5x5 kernel).
    pub preprocess_sigma: f32,

    /// Gaussian sigma applied to the grayscale image inside the reference
    /// detector (roughly a 7x7 kernel).
    pub detect_sigma: f32,

    /// Canny low threshold for reference detection.
    pub canny_low: f32,

    /// Canny high threshold for reference detection.
    pub canny_high: f32,

    /// Polygon approximation tolerance as a fraction of the contour
    /// perimeter.
    pub approx_epsilon: f64,

    /// Minimum bounding-box side, in pixels, for a quadrilateral to count
    /// as the reference object.
    pub min_reference_side: f64,

    /// How confidence is scored for a measured outline.
    pub confidence: ConfidenceModel,
}

impl PipelineConfig {
    /// Default preprocessing blur sigma.
    pub const DEFAULT_PREPROCESS_SIGMA: f32 = 1.1;
    /// Default detector blur sigma.
    pub const DEFAULT_DETECT_SIGMA: f32 = 1.4;
    /// Default Canny low threshold.
    pub const DEFAULT_CANNY_LOW: f32 = 50.0;
    /// Default Canny high threshold.
    pub const DEFAULT_CANNY_HIGH: f32 = 100.0;
    /// Default polygon approximation tolerance (fraction of perimeter).
    pub const DEFAULT_APPROX_EPSILON: f64 = 0.02;
    /// Default minimum reference bounding-box side in pixels.
    pub const DEFAULT_MIN_REFERENCE_SIDE: f64 = 50.0;

    /// Check the numeric invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// violated invariant.
    pub fn validate(&self) -> Result<(), PipelineError> {
        // Zero disables a blur; NaN never compares true, so it is caught too.
        for (name, sigma) in [
            ("preprocess_sigma", self.preprocess_sigma),
            ("detect_sigma", self.detect_sigma),
        ] {
            if !(sigma.is_finite() && sigma >= 0.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {sigma}"
                )));
            }
        }
        if !(self.canny_low.is_finite() && self.canny_high.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!(
                "canny thresholds must be finite, got {} and {}",
                self.canny_low, self.canny_high
            )));
        }
        if self.canny_low > self.canny_high {
            return Err(PipelineError::InvalidConfig(format!(
                "canny_low ({}) must not exceed canny_high ({})",
                self.canny_low, self.canny_high
            )));
        }
        if !(self.approx_epsilon > 0.0 && self.approx_epsilon < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "approx_epsilon must be in (0, 1), got {}",
                self.approx_epsilon
            )));
        }
        if !(self.min_reference_side.is_finite() && self.min_reference_side >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "min_reference_side must be finite and non-negative, got {}",
                self.min_reference_side
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocess_sigma: Self::DEFAULT_PREPROCESS_SIGMA,
            detect_sigma: Self::DEFAULT_DETECT_SIGMA,
            canny_low: Self::DEFAULT_CANNY_LOW,
            canny_high: Self::DEFAULT_CANNY_HIGH,
            approx_epsilon: Self::DEFAULT_APPROX_EPSILON,
            min_reference_side: Self::DEFAULT_MIN_REFERENCE_SIDE,
            confidence: ConfidenceModel::default(),
        }
    }
}

/// Errors that can occur during a measurement run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The image data could not be decoded.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image data was empty (zero bytes).
    #[error("input image data is empty")]
    EmptyInput,

    /// Configuration parameters are invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The declared reference type is not in the catalog.
    #[error("unknown reference object type '{0}'")]
    UnknownReference(String),

    /// No qualifying quadrilateral was found.
    #[error("no reference object could be detected in the image")]
    ReferenceNotFound,

    /// The calibrator could not derive a positive scale.
    #[error("could not calculate pixel scale for reference '{0}'; check its configured dimensions")]
    UncalibratableScale(String),

    /// Thresholding the rectified image produced no contours.
    #[error("no object outline found in the rectified image")]
    ContourNotFound,
}

impl PipelineError {
    /// Short name of the stage that raised this error.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::ImageDecode(_) | Self::EmptyInput => "image decoding",
            Self::InvalidConfig(_) => "configuration",
            Self::UnknownReference(_) | Self::ReferenceNotFound => "reference detection",
            Self::UncalibratableScale(_) => "scale calibration",
            Self::ContourNotFound => "contour extraction",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square(side: f64) -> Polyline {
        Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(side, 0.0),
            Point::new(side, side),
            Point::new(0.0, side),
        ])
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < 1e-12);
        assert!((a.distance_squared(b) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn closed_length_includes_closing_segment() {
        assert!((square(10.0).closed_length() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn enclosed_area_ignores_orientation() {
        let cw = square(10.0);
        let ccw = Polyline::new(cw.points().iter().rev().copied().collect());
        assert!((cw.enclosed_area() - 100.0).abs() < 1e-9);
        assert!((ccw.enclosed_area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_outline_has_no_area() {
        let line = Polyline::new(vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        assert!(line.enclosed_area().abs() < f64::EPSILON);
    }

    #[test]
    fn bounding_box_is_inclusive() {
        let bbox = square(9.0).bounding_box().unwrap();
        assert!((bbox.width - 10.0).abs() < f64::EPSILON);
        assert!((bbox.height - 10.0).abs() < f64::EPSILON);
        assert!(Polyline::new(vec![]).bounding_box().is_none());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_canny_thresholds_are_rejected() {
        let config = PipelineConfig {
            canny_low: 200.0,
            canny_high: 100.0,
            ..PipelineConfig::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn bad_sigmas_and_sizes_are_rejected() {
        let invalid = [
            PipelineConfig {
                detect_sigma: f32::NAN,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                preprocess_sigma: -3.0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                preprocess_sigma: f32::INFINITY,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                min_reference_side: f64::NAN,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                canny_high: f32::NAN,
                ..PipelineConfig::default()
            },
        ];
        for config in invalid {
            let result = config.validate();
            assert!(
                matches!(result, Err(PipelineError::InvalidConfig(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn zero_sigmas_disable_blur_and_are_valid() {
        let config = PipelineConfig {
            preprocess_sigma: 0.0,
            detect_sigma: 0.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_deserializes_with_missing_fields() {
        let config: PipelineConfig = serde_json::from_str(r#"{"canny_low": 30.0}"#).unwrap();
        assert!((config.canny_low - 30.0).abs() < f32::EPSILON);
        assert!((config.canny_high - PipelineConfig::DEFAULT_CANNY_HIGH).abs() < f32::EPSILON);
    }

    #[test]
    fn errors_name_their_stage() {
        assert_eq!(
            PipelineError::ReferenceNotFound.stage(),
            "reference detection"
        );
        assert_eq!(
            PipelineError::UncalibratableScale("ruler".into()).stage(),
            "scale calibration"
        );
        assert_eq!(PipelineError::ContourNotFound.stage(), "contour extraction");
    }
}
