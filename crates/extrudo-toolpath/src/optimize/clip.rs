//! Keep travels inside printed material.
//!
//! A travel whose endpoints both lie in the same contour is rerouted along
//! contour boundaries wherever its straight chord would cross a void (a hole
//! or a concave bay). Material is decided with the even-odd rule over all
//! contours, so nested holes and islands need no orientation convention.

use extrudo_math::{lerp, segment_intersection, Point2};

use crate::path::Polygon;
use crate::segment::Segment;

/// Crossings this close to a travel's endpoints (in chord parameter) are ignored.
const ENDPOINT_EPS: f64 = 1e-6;

/// A point where a travel meets a contour boundary.
#[derive(Debug, Clone, Copy)]
struct Crossing {
    /// Parameter along the travel chord.
    t: f64,
    /// Contour index.
    polygon: usize,
    /// Edge index within the contour.
    edge: usize,
    /// Parameter along that edge.
    u: f64,
}

/// Reroute travels around voids; returns how many travels were changed.
///
/// `max_error` is the distance within which a travel endpoint counts as
/// lying on a contour boundary.
pub fn clip_movements(segments: &mut Vec<Segment>, contours: &[Polygon], max_error: f64) -> usize {
    if contours.is_empty() {
        return 0;
    }
    let mut out = Vec::with_capacity(segments.len());
    let mut changed = 0;
    for seg in segments.drain(..) {
        if seg.is_move() && seg.arc.is_none() && !seg.is_command() && seg.length() > max_error {
            if let Some(route) = reroute(&seg.from, &seg.to, contours, max_error) {
                for w in route.windows(2) {
                    let mut piece = seg.clone();
                    piece.from = w[0];
                    piece.to = w[1];
                    out.push(piece);
                }
                changed += 1;
                continue;
            }
        }
        out.push(seg);
    }
    *segments = out;
    changed
}

/// Is `p` inside or on the boundary of `polygon`?
fn encloses(polygon: &Polygon, p: &Point2, max_error: f64) -> bool {
    polygon.contains(p) || polygon.distance_to_boundary(p) < max_error
}

/// Even-odd material test over all contours.
fn in_material(contours: &[Polygon], p: &Point2) -> bool {
    contours.iter().filter(|c| c.contains(p)).count() % 2 == 1
}

/// Polyline from `a` to `b` avoiding voids, or `None` when the chord is fine
/// or cannot be fixed.
fn reroute(a: &Point2, b: &Point2, contours: &[Polygon], max_error: f64) -> Option<Vec<Point2>> {
    if !contours
        .iter()
        .any(|c| c.len() >= 3 && encloses(c, a, max_error) && encloses(c, b, max_error))
    {
        return None;
    }

    let mut events = Vec::new();
    if let Some(c) = boundary_event(a, 0.0, contours, max_error) {
        events.push(c);
    }
    for (pi, polygon) in contours.iter().enumerate() {
        let pts = &polygon.points;
        let n = pts.len();
        if n < 3 {
            continue;
        }
        for e in 0..n {
            if let Some((t, u)) = segment_intersection(a, b, &pts[e], &pts[(e + 1) % n]) {
                if t > ENDPOINT_EPS && t < 1.0 - ENDPOINT_EPS {
                    events.push(Crossing { t, polygon: pi, edge: e, u });
                }
            }
        }
    }
    if let Some(c) = boundary_event(b, 1.0, contours, max_error) {
        events.push(c);
    }
    events.sort_by(|x, y| x.t.total_cmp(&y.t));
    // A chord through a vertex hits both adjacent edges.
    events.dedup_by(|x, y| x.polygon == y.polygon && (x.t - y.t).abs() < ENDPOINT_EPS);

    let mut route = vec![*a];
    let mut rerouted = false;
    for pair in events.windows(2) {
        let (c0, c1) = (pair[0], pair[1]);
        if c0.polygon != c1.polygon || c1.t - c0.t < ENDPOINT_EPS {
            continue;
        }
        let mid = lerp(a, b, (c0.t + c1.t) / 2.0);
        if in_material(contours, &mid) {
            continue;
        }
        let walk = boundary_walk(&contours[c0.polygon], &c0, &c1);
        route.extend(walk);
        rerouted = true;
    }
    if !rerouted {
        return None;
    }
    route.push(*b);
    route.dedup_by(|x, y| (*x - *y).norm() < max_error);
    if route.len() < 2 {
        return None;
    }
    Some(route)
}

/// Boundary position of an endpoint, if it lies on some contour.
fn boundary_event(p: &Point2, t: f64, contours: &[Polygon], max_error: f64) -> Option<Crossing> {
    contours
        .iter()
        .enumerate()
        .filter(|(_, c)| c.len() >= 3)
        .filter_map(|(i, c)| {
            let (edge, u, q) = c.closest_boundary_point(p)?;
            let d = (q - p).norm();
            (d < max_error).then_some((d, Crossing { t, polygon: i, edge, u }))
        })
        .min_by(|x, y| x.0.total_cmp(&y.0))
        .map(|(_, c)| c)
}

/// Shorter way along `polygon` from crossing `from` to crossing `to`.
fn boundary_walk(polygon: &Polygon, from: &Crossing, to: &Crossing) -> Vec<Point2> {
    let pts = &polygon.points;
    let n = pts.len();
    let at = |c: &Crossing| lerp(&pts[c.edge], &pts[(c.edge + 1) % n], c.u);
    let (start, end) = (at(from), at(to));

    let mut forward = vec![start];
    if !(from.edge == to.edge && from.u <= to.u) {
        let mut k = from.edge;
        loop {
            k = (k + 1) % n;
            forward.push(pts[k]);
            if k == to.edge {
                break;
            }
        }
    }
    forward.push(end);

    let mut backward = vec![start];
    if !(from.edge == to.edge && from.u >= to.u) {
        let stop = (to.edge + 1) % n;
        let mut k = from.edge;
        loop {
            backward.push(pts[k]);
            if k == stop {
                break;
            }
            k = (k + n - 1) % n;
        }
    }
    backward.push(end);

    if polyline_length(&forward) <= polyline_length(&backward) {
        forward
    } else {
        backward
    }
}

fn polyline_length(points: &[Point2]) -> f64 {
    points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
}
