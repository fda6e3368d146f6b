//! Greedy nearest-polygon-first toolpath construction.

use extrudo_math::{Point2, Tolerance};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::path::PrintPolygon;
use crate::progress::Progress;
use crate::segment::Segment;
use crate::settings::BuilderSettings;

/// Polygons handled between two progress checks.
const PROGRESS_INTERVAL: usize = 64;

/// Relative slack under which two nearest-vertex distances count as equal.
const TIE_EPS: f64 = 1e-9;

/// Ordered segment list produced from a polygon set.
#[derive(Debug, Clone)]
pub struct BuiltPath {
    /// Lines and travels in print order.
    pub segments: Vec<Segment>,
    /// Where the nozzle ends up.
    pub end_point: Point2,
    /// Indices of printed polygons in visit order.
    pub order: Vec<usize>,
}

struct Cursor {
    at: Point2,
    move_speed: f64,
    segments: Vec<Segment>,
}

impl Cursor {
    /// Append a line, inserting a travel when it does not start at the cursor.
    fn add_line(&mut self, poly: &PrintPolygon, from: Point2, to: Point2) {
        let tol = Tolerance::TOOLPATH;
        if tol.points_equal_2d(&from, &to) {
            return;
        }
        if !tol.points_equal_2d(&self.at, &from) {
            self.segments.push(Segment::travel(
                poly.area,
                poly.extruder_id,
                self.at,
                from,
                self.move_speed,
            ));
        }
        self.segments.push(Segment::line(
            poly.area,
            poly.extruder_id,
            from,
            to,
            poly.speed,
            poly.extrusion_factor,
        ));
        self.at = to;
    }
}

/// Order `polygons` greedily starting at `start` and convert them to segments.
///
/// Each step picks the unvisited polygon whose nearest vertex is closest to
/// the current position and walks it closed from that vertex. Polygons with
/// fewer than two vertices are skipped.
pub fn build(
    polygons: &[PrintPolygon],
    start: Point2,
    settings: &BuilderSettings,
    move_speed: f64,
    progress: &dyn Progress,
) -> Result<BuiltPath> {
    let mut visited: Vec<bool> = polygons.iter().map(|p| p.polygon.len() < 2).collect();
    let mut remaining = visited.iter().filter(|v| !**v).count();
    let mut cursor = Cursor {
        at: start,
        move_speed,
        segments: Vec::new(),
    };
    let mut order = Vec::with_capacity(remaining);
    let mut last_edge_length: Option<f64> = None;

    while remaining > 0 {
        if order.len() % PROGRESS_INTERVAL == 0 && !progress.update("build", order.len(), polygons.len()) {
            return Err(EngineError::Cancelled("path building"));
        }

        let Some((index, nearest)) = pick_next(polygons, &visited, &cursor.at, settings, last_edge_length) else {
            break;
        };
        visited[index] = true;
        remaining -= 1;

        let poly = &polygons[index];
        let points = &poly.polygon.points;
        let n = points.len();
        let first = if order.is_empty() && settings.displace_start {
            (nearest + 1) % n
        } else {
            nearest
        };
        for k in 0..n {
            let from = points[(first + k) % n];
            let to = points[(first + k + 1) % n];
            cursor.add_line(poly, from, to);
        }

        last_edge_length = Some(poly.polygon.average_edge_length());
        order.push(index);
    }

    debug!(
        polygons = order.len(),
        segments = cursor.segments.len(),
        "built toolpath"
    );

    Ok(BuiltPath {
        segments: cursor.segments,
        end_point: cursor.at,
        order,
    })
}

/// Unvisited polygon with the nearest vertex, and that vertex's index.
fn pick_next(
    polygons: &[PrintPolygon],
    visited: &[bool],
    at: &Point2,
    settings: &BuilderSettings,
    last_edge_length: Option<f64>,
) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (i, poly) in polygons.iter().enumerate() {
        if visited[i] {
            continue;
        }
        let Some((vertex, d2)) = poly.polygon.nearest_vertex(at) else {
            continue;
        };
        best = match best {
            None => Some((i, vertex, d2)),
            Some((bi, bv, bd2)) => {
                let slack = TIE_EPS * bd2.max(1.0);
                if d2 < bd2 - slack {
                    Some((i, vertex, d2))
                } else if d2 <= bd2 + slack && settings.prefer_similar_edges && closer_edges(polygons, i, bi, last_edge_length) {
                    Some((i, vertex, d2))
                } else {
                    Some((bi, bv, bd2))
                }
            }
        };
    }
    best.map(|(i, v, _)| (i, v))
}

/// Is polygon `a`'s average edge length closer to `reference` than `b`'s?
fn closer_edges(polygons: &[PrintPolygon], a: usize, b: usize, reference: Option<f64>) -> bool {
    let Some(reference) = reference else {
        return false;
    };
    let da = (polygons[a].polygon.average_edge_length() - reference).abs();
    let db = (polygons[b].polygon.average_edge_length() - reference).abs();
    da < db
}
