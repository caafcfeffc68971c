//! Perspective rectification of a detected quadrilateral.
//!
//! The four corners are ordered, the output size is taken from the
//! longest opposite edges, and the region is warped into an
//! axis-aligned rectangle with a projective transform. The long side of
//! the quadrilateral always ends up along the output's x axis.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};

use crate::types::{Dimensions, Point};

/// Order four corners as top-left, top-right, bottom-right, bottom-left.
///
/// Top-left has the smallest `x + y`, bottom-right the largest;
/// top-right has the smallest `y - x`, bottom-left the largest. When that
/// rule assigns one point to two roles (diamond-like shapes) the corners
/// are ordered clockwise by angle around their centroid instead, starting
/// from the one nearest the top-left.
#[must_use]
pub fn order_corners(corners: [Point; 4]) -> [Point; 4] {
    let by = |key: fn(&Point) -> f64, largest: bool| -> usize {
        let mut best = 0;
        for i in 1..4 {
            let better = if largest {
                key(&corners[i]) > key(&corners[best])
            } else {
                key(&corners[i]) < key(&corners[best])
            };
            if better {
                best = i;
            }
        }
        best
    };

    let tl = by(|p| p.x + p.y, false);
    let br = by(|p| p.x + p.y, true);
    let tr = by(|p| p.y - p.x, false);
    let bl = by(|p| p.y - p.x, true);

    let mut seen = [false; 4];
    for i in [tl, tr, br, bl] {
        seen[i] = true;
    }
    if seen.iter().all(|s| *s) {
        return [corners[tl], corners[tr], corners[br], corners[bl]];
    }

    order_by_angle(corners)
}

fn order_by_angle(mut corners: [Point; 4]) -> [Point; 4] {
    let cx = corners.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = corners.iter().map(|p| p.y).sum::<f64>() / 4.0;
    // Image y grows downward, so ascending atan2 is clockwise on screen.
    let angle = |q: &Point| (q.y - cy).atan2(q.x - cx);
    corners.sort_by(|a, b| angle(a).total_cmp(&angle(b)));

    let mut start = 0;
    for i in 1..4 {
        if corners[i].x + corners[i].y < corners[start].x + corners[start].y {
            start = i;
        }
    }
    corners.rotate_left(start);
    corners
}

/// Output size for ordered corners: the longer of each pair of opposite
/// edges, rounded, at least one pixel.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rectified_size(ordered: &[Point; 4]) -> Dimensions {
    let [tl, tr, br, bl] = *ordered;
    let width = tl.distance(tr).max(bl.distance(br));
    let height = tl.distance(bl).max(tr.distance(br));
    Dimensions {
        width: width.round().max(1.0) as u32,
        height: height.round().max(1.0) as u32,
    }
}

/// Order `corners` so the longer edges run along the x axis.
///
/// Portrait quadrilaterals are rotated a quarter turn by shifting the
/// corner order, which keeps the result a rotation rather than a mirror.
#[must_use]
pub fn landscape_corners(corners: [Point; 4]) -> [Point; 4] {
    let ordered = order_corners(corners);
    let size = rectified_size(&ordered);
    if size.height > size.width {
        let [tl, tr, br, bl] = ordered;
        [bl, tl, tr, br]
    } else {
        ordered
    }
}

/// Warp the region bounded by `corners` into an axis-aligned rectangle.
///
/// Returns `None` when the corners are degenerate and no projective
/// transform exists.
#[must_use]
pub fn rectify(image: &RgbImage, corners: [Point; 4]) -> Option<RgbImage> {
    let ordered = landscape_corners(corners);
    let Dimensions { width, height } = rectified_size(&ordered);

    #[allow(clippy::cast_precision_loss)]
    let (w, h) = ((width - 1) as f32, (height - 1) as f32);
    let src = ordered.map(Point::to_f32_pair);
    let dest = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

    let projection = Projection::from_control_points(src, dest)?;
    let mut output = RgbImage::new(width, height);
    warp_into(
        image,
        &projection,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut output,
    );
    Some(output)
}
