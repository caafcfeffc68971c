//! Physical dimensions of an outline from its minimum-area rectangle.
//!
//! The outline is fitted with the smallest rotated rectangle enclosing
//! all of its points. The rectangle's longer side is the object's
//! length, the shorter its width, both divided by the pixel scale.

use geo::{MinimumRotatedRect, MultiPoint};
use serde::{Deserialize, Serialize};

use crate::types::Polyline;

/// Confidence reported by [`ConfidenceModel::Placeholder`].
pub const PLACEHOLDER_CONFIDENCE: f64 = 0.85;

/// Scores how trustworthy a measured outline is.
pub trait ConfidenceScorer {
    /// Confidence in `[0, 1]` for a measurement derived from `outline`.
    fn score(&self, outline: &Polyline) -> f64;
}

/// Available confidence strategies.
///
/// Selected from configuration; new strategies are added as variants so
/// the choice stays serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceModel {
    /// Fixed score of [`PLACEHOLDER_CONFIDENCE`] for every outline.
    #[default]
    Placeholder,
}

impl ConfidenceScorer for ConfidenceModel {
    fn score(&self, _outline: &Polyline) -> f64 {
        match self {
            Self::Placeholder => PLACEHOLDER_CONFIDENCE,
        }
    }
}

/// Measured size of the object, in the reference object's units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectDimensions {
    /// Longer side of the minimum-area rectangle.
    pub length: f64,
    /// Shorter side of the minimum-area rectangle.
    pub width: f64,
    /// `length * width`: the rectangle's area, not the outline's.
    pub area: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl ObjectDimensions {
    /// Result for outlines too small to fit a rectangle.
    pub const DEGENERATE: Self = Self {
        length: 0.0,
        width: 0.0,
        area: 0.0,
        confidence: 0.0,
    };
}

/// Side lengths `(long, short)` in pixels of the minimum-area rectangle
/// enclosing `outline`, or `None` when it has fewer than 4 points.
#[must_use]
pub fn min_area_rect_sides(outline: &Polyline) -> Option<(f64, f64)> {
    if outline.len() < 4 {
        return None;
    }

    let cloud: MultiPoint<f64> = outline
        .points()
        .iter()
        .map(|p| geo::Point::new(p.x, p.y))
        .collect();

    // Collinear clouds have a zero-width rectangle; geo may report that as
    // a degenerate polygon or not at all.
    let Some(rect) = cloud.minimum_rotated_rect() else {
        return Some((collinear_extent(outline), 0.0));
    };
    let corners: Vec<geo::Coord<f64>> = rect.exterior().coords().copied().collect();
    if corners.len() < 3 {
        return Some((collinear_extent(outline), 0.0));
    }

    let a = side(corners[0], corners[1]);
    let b = side(corners[1], corners[2]);
    Some((a.max(b), a.min(b)))
}

fn side(p: geo::Coord<f64>, q: geo::Coord<f64>) -> f64 {
    (p.x - q.x).hypot(p.y - q.y)
}

fn collinear_extent(outline: &Polyline) -> f64 {
    let points = outline.points();
    let mut best = 0.0_f64;
    for (i, p) in points.iter().enumerate() {
        for q in &points[i + 1..] {
            best = best.max(p.distance(*q));
        }
    }
    best
}

/// Convert `outline` into physical dimensions at `scale` pixels per unit.
///
/// Outlines with fewer than 4 points, or a non-positive scale, give
/// [`ObjectDimensions::DEGENERATE`].
#[must_use]
pub fn calculate_dimensions(
    outline: &Polyline,
    scale: f64,
    model: &impl ConfidenceScorer,
) -> ObjectDimensions {
    if scale <= 0.0 {
        return ObjectDimensions::DEGENERATE;
    }
    let Some((long_px, short_px)) = min_area_rect_sides(outline) else {
        return ObjectDimensions::DEGENERATE;
    };

    let length = long_px / scale;
    let width = short_px / scale;
    ObjectDimensions {
        length,
        width,
        area: length * width,
        confidence: model.score(outline),
    }
}
