//! Polygon approximation using the Ramer-Douglas-Peucker algorithm.
//!
//! The reference detector approximates every traced outline with a
//! coarse polygon and looks for one with exactly four vertices. Outlines
//! are closed, so the open-curve RDP is applied to two halves split at a
//! pair of mutually distant points. Both split points are extreme points
//! of the outline and therefore survive as vertices.

use crate::types::{Point, Polyline};

/// Approximate a closed outline with a polygon.
///
/// Points within `tolerance` pixels of the chord between retained
/// neighbours are dropped. Outlines with fewer than 3 points are returned
/// unchanged.
#[must_use = "returns the approximated polygon"]
pub fn approximate_closed(outline: &Polyline, tolerance: f64) -> Polyline {
    let points = outline.points();
    let n = points.len();
    if n < 3 {
        return outline.clone();
    }

    let a = farthest_from(points, points[0]);
    let b = farthest_from(points, points[a]);
    if a == b {
        return Polyline::new(vec![points[a]]);
    }
    let (start, split) = if a < b { (a, b) } else { (b, a) };

    // Rotate so the curve starts at `start`, then close it back onto itself.
    let mut ring: Vec<Point> = points[start..]
        .iter()
        .chain(&points[..start])
        .copied()
        .collect();
    ring.push(points[start]);
    let split = split - start;

    let mut kept = vec![false; ring.len()];
    kept[0] = true;
    kept[split] = true;
    rdp_recurse(&ring, 0, split, tolerance, &mut kept);
    rdp_recurse(&ring, split, ring.len() - 1, tolerance, &mut kept);

    // The last ring point duplicates the first.
    let simplified: Vec<Point> = ring[..ring.len() - 1]
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect();

    Polyline::new(simplified)
}

/// Index of the point farthest from `origin` (first one on ties).
fn farthest_from(points: &[Point], origin: Point) -> usize {
    let mut best = 0;
    let mut best_dist = -1.0;
    for (i, p) in points.iter().enumerate() {
        let d = p.distance_squared(origin);
        if d > best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

/// Recursive step of the Ramer-Douglas-Peucker algorithm.
///
/// Finds the point between `start` and `end` that is farthest from the
/// segment between them. If that distance exceeds `tolerance`, the point
/// is kept and both sub-segments are processed recursively.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;

    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Perpendicular distance from point `p` to the line through `a` and `b`.
///
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}
