//! Closed contours handed to the toolpath planner.

use extrudo_math::{closest_on_segment, Point2};
use serde::{Deserialize, Serialize};

use crate::segment::Area;

/// A 2D polygon (closed path).
#[derive(Debug, Clone, Default)]
pub struct Polygon {
    /// Vertices of the polygon in order.
    pub points: Vec<Point2>,
}

impl Polygon {
    /// Create a new polygon from points.
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    /// Check if the polygon is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Signed area of the polygon.
    /// Positive for counter-clockwise, negative for clockwise.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut area = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.points[i].x * self.points[j].y;
            area -= self.points[j].x * self.points[i].y;
        }
        area / 2.0
    }

    /// Is the polygon counter-clockwise? Outer contours are, holes are not.
    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Reverse the winding order.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Perimeter length.
    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        (0..n).map(|i| self.edge_length(i)).sum()
    }

    /// Length of the edge starting at vertex `i` (wrapping around).
    pub fn edge_length(&self, i: usize) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        (self.points[(i + 1) % n] - self.points[i % n]).norm()
    }

    /// Mean edge length; zero for polygons with fewer than two vertices.
    pub fn average_edge_length(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        self.perimeter() / self.points.len() as f64
    }

    /// Index of the vertex nearest to `p` and its squared distance.
    pub fn nearest_vertex(&self, p: &Point2) -> Option<(usize, f64)> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, v)| (i, (v - p).norm_squared()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Closest point on the boundary to `p`: `(edge index, parameter, point)`.
    pub fn closest_boundary_point(&self, p: &Point2) -> Option<(usize, f64, Point2)> {
        let n = self.points.len();
        if n < 2 {
            return None;
        }
        (0..n)
            .map(|i| {
                let (q, t) = closest_on_segment(p, &self.points[i], &self.points[(i + 1) % n]);
                (i, t, q)
            })
            .min_by(|a, b| (a.2 - p).norm_squared().total_cmp(&(b.2 - p).norm_squared()))
    }

    /// Distance from `p` to the polygon boundary.
    pub fn distance_to_boundary(&self, p: &Point2) -> f64 {
        self.closest_boundary_point(p)
            .map(|(_, _, q)| (q - p).norm())
            .unwrap_or(f64::INFINITY)
    }

    /// Check if a point is inside the loop (even-odd rule, orientation ignored).
    pub fn contains(&self, point: &Point2) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;

        for i in 0..n {
            let pi = &self.points[i];
            let pj = &self.points[j];

            if ((pi.y > point.y) != (pj.y > point.y))
                && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
            {
                inside = !inside;
            }
            j = i;
        }

        inside
    }
}

/// A contour together with how it should be printed.
#[derive(Debug, Clone)]
pub struct PrintPolygon {
    /// The closed contour.
    pub polygon: Polygon,
    /// Feature type of the contour.
    pub area: Area,
    /// Print speed (mm/s).
    pub speed: f64,
    /// Relative extrusion feed for every edge (1.0 = nominal).
    pub extrusion_factor: f64,
    /// Extruder printing this contour.
    pub extruder_id: u32,
}

impl PrintPolygon {
    /// A contour printed with nominal extrusion on extruder 0.
    pub fn new(polygon: Polygon, area: Area, speed: f64) -> Self {
        Self {
            polygon,
            area,
            speed,
            extrusion_factor: 1.0,
            extruder_id: 0,
        }
    }

    /// Builder: set the extrusion factor.
    pub fn with_extrusion_factor(mut self, factor: f64) -> Self {
        self.extrusion_factor = factor;
        self
    }

    /// Builder: set the extruder.
    pub fn with_extruder(mut self, extruder_id: u32) -> Self {
        self.extruder_id = extruder_id;
        self
    }
}

/// Axis-aligned square contour, counter-clockwise from `(x, y)`.
pub fn square(x: f64, y: f64, size: f64) -> Polygon {
    Polygon::new(vec![
        Point2::new(x, y),
        Point2::new(x + size, y),
        Point2::new(x + size, y + size),
        Point2::new(x, y + size),
    ])
}

/// Serializable description of a contour, used by drivers that read layers
/// from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonSpec {
    /// Feature type.
    #[serde(default)]
    pub area: Area,
    /// Print speed (mm/s).
    pub speed: f64,
    /// Relative extrusion feed.
    #[serde(default = "default_extrusion_factor")]
    pub extrusion_factor: f64,
    /// Extruder index.
    #[serde(default)]
    pub extruder_id: u32,
    /// Vertices as `[x, y]` pairs.
    pub points: Vec<[f64; 2]>,
}

fn default_extrusion_factor() -> f64 {
    1.0
}

impl From<&PolygonSpec> for PrintPolygon {
    fn from(spec: &PolygonSpec) -> Self {
        let points = spec.points.iter().map(|p| Point2::new(p[0], p[1])).collect();
        Self {
            polygon: Polygon::new(points),
            area: spec.area,
            speed: spec.speed,
            extrusion_factor: spec.extrusion_factor,
            extruder_id: spec.extruder_id,
        }
    }
}
