#![warn(missing_docs)]

//! Math types for the extrudo toolpath engine.
//!
//! Thin wrappers around nalgebra providing the planar geometry a toolpath
//! planner needs: points and vectors, tolerance constants, turn angles,
//! perpendicular-bisector circle construction and segment intersection.

use nalgebra::{Vector2, Vector3};
use std::f64::consts::{PI, TAU};

/// A point in 3D space (toolhead position).
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A point in the layer plane.
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in the layer plane.
pub type Vec2 = Vector2<f64>;

/// Relative threshold below which two chords count as parallel.
const PARALLEL_EPS: f64 = 1e-9;

/// Tolerance constants for geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Linear distance tolerance in mm.
    pub linear: f64,
    /// Angular tolerance in radians.
    pub angular: f64,
}

impl Tolerance {
    /// Tight tolerances (1e-6 mm linear, 1e-9 rad angular).
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        angular: 1e-9,
    };

    /// Toolpath tolerances (0.1 µm linear, 1 µrad angular).
    ///
    /// Coordinates coming out of contour generation are rarely better than
    /// this, so adjacency checks between segments use it.
    pub const TOOLPATH: Self = Self {
        linear: 1e-4,
        angular: 1e-6,
    };

    /// Check if two 3D points are coincident within tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a - b).norm() < self.linear
    }

    /// Check if two planar points are coincident within tolerance.
    pub fn points_equal_2d(&self, a: &Point2, b: &Point2) -> bool {
        (a - b).norm() < self.linear
    }

    /// Check if a scalar distance is effectively zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() < self.linear
    }

    /// Check if two angles are effectively equal (in radians).
    pub fn angles_equal(&self, a: f64, b: f64) -> bool {
        (a - b).abs() < self.angular
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Z component of the cross product of two planar vectors.
pub fn cross(a: &Vec2, b: &Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Direction angle of `v`, normalized to `[0, 2π)`.
pub fn direction_angle(v: &Vec2) -> f64 {
    let a = v.y.atan2(v.x);
    if a < 0.0 {
        a + TAU
    } else {
        a
    }
}

/// Signed turn from direction `a` to direction `b` in `[-π, π]`.
///
/// Positive values are left (counter-clockwise) turns. Zero vectors give 0.
pub fn turn_angle(a: &Vec2, b: &Vec2) -> f64 {
    cross(a, b).atan2(a.dot(b))
}

/// Normalize an angle to `(-π, π]`.
pub fn normalize_angle(mut a: f64) -> f64 {
    while a > PI {
        a -= TAU;
    }
    while a <= -PI {
        a += TAU;
    }
    a
}

/// Midpoint of two points.
pub fn midpoint(a: &Point2, b: &Point2) -> Point2 {
    Point2::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
}

/// Point at parameter `t` along `a → b`.
pub fn lerp(a: &Point2, b: &Point2, t: f64) -> Point2 {
    a + (b - a) * t
}

/// Lift a planar point onto the plane at height `z`.
pub fn lift(p: &Point2, z: f64) -> Point3 {
    Point3::new(p.x, p.y, z)
}

/// Drop the Z coordinate.
pub fn flatten(p: &Point3) -> Point2 {
    Point2::new(p.x, p.y)
}

/// Intersection of the perpendicular bisectors of chords `a → b` and `c → d`.
///
/// Returns `None` when either chord is degenerate or the chords are parallel
/// (the bisectors never meet).
pub fn bisector_intersection(a: &Point2, b: &Point2, c: &Point2, d: &Point2) -> Option<Point2> {
    let n1 = b - a;
    let n2 = d - c;
    let det = cross(&n1, &n2);
    if det.abs() <= PARALLEL_EPS * n1.norm() * n2.norm() {
        return None;
    }
    let r1 = n1.dot(&midpoint(a, b).coords);
    let r2 = n2.dot(&midpoint(c, d).coords);
    Some(Point2::new(
        (r1 * n2.y - n1.y * r2) / det,
        (n1.x * r2 - r1 * n2.x) / det,
    ))
}

/// Center of the circle through three points, if they are not collinear.
pub fn circumcenter(a: &Point2, b: &Point2, c: &Point2) -> Option<Point2> {
    bisector_intersection(a, b, b, c)
}

/// Closest point to `p` on segment `a → b` and its parameter in `[0, 1]`.
pub fn closest_on_segment(p: &Point2, a: &Point2, b: &Point2) -> (Point2, f64) {
    let d = b - a;
    let len_sq = d.norm_squared();
    if len_sq == 0.0 {
        return (*a, 0.0);
    }
    let t = ((p - a).dot(&d) / len_sq).clamp(0.0, 1.0);
    (a + d * t, t)
}

/// Distance from `p` to segment `a → b`.
pub fn point_segment_distance(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let (q, _) = closest_on_segment(p, a, b);
    (p - q).norm()
}

/// Distance from `p` to the infinite line through `a` and `b`.
///
/// Falls back to the point distance when the line is degenerate.
pub fn point_line_distance(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let d = b - a;
    let len = d.norm();
    if len == 0.0 {
        return (p - a).norm();
    }
    cross(&d, &(p - a)).abs() / len
}

/// Intersection parameters of segments `a → b` and `c → d`.
///
/// Returns `(t, u)` with the intersection at `a + t·(b−a) = c + u·(d−c)`,
/// both in `[0, 1]`. Parallel or disjoint segments give `None`.
pub fn segment_intersection(a: &Point2, b: &Point2, c: &Point2, d: &Point2) -> Option<(f64, f64)> {
    let r = b - a;
    let s = d - c;
    let denom = cross(&r, &s);
    if denom.abs() <= PARALLEL_EPS * r.norm() * s.norm() {
        return None;
    }
    let qp = c - a;
    let t = cross(&qp, &s) / denom;
    let u = cross(&qp, &r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some((t, u))
    } else {
        None
    }
}
