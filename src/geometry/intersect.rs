//! Stateless overlap tests and closest-point queries.

use glam::Vec2;

/// Strict overlap of two circles: touching circles do not overlap.
#[inline]
pub fn circles_overlap(center_a: Vec2, radius_a: f32, center_b: Vec2, radius_b: f32) -> bool {
    let r = radius_a + radius_b;
    center_a.distance_squared(center_b) < r * r
}

/// Closest point on segment `a`-`b` to `point`, with its parameter `t` in `[0, 1]`.
///
/// A zero-length segment collapses to `a`.
#[inline]
pub fn closest_point_on_segment(a: Vec2, b: Vec2, point: Vec2) -> (Vec2, f32) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return (a, 0.0);
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (a + ab * t, t)
}
