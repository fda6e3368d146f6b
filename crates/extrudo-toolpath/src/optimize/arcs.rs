//! Replace runs of short chords by circular arcs.

use extrudo_math::{bisector_intersection, circumcenter, turn_angle, Point2, Tolerance};

use crate::segment::{Arc, ArcDirection, Segment};
use crate::settings::ArcSettings;

/// Allowed mismatch between the fitted sweep and the chords' central angles.
const SWEEP_TOLERANCE: f64 = 1e-3;

/// Fit arcs into `segments`; returns the number of arcs created.
///
/// A run is a maximal sequence of adjacent straight extruding lines with the
/// same speed, feed, area and extruder, where every turn keeps its sign,
/// stays between the minimum turn and the maximum arc angle, and the
/// circumcenter of consecutive chords does not drift. Runs that fail the
/// final circle check are left untouched.
pub fn fit_arcs(segments: &mut Vec<Segment>, settings: &ArcSettings) -> usize {
    let min_run = settings.min_segments.max(3);
    if !settings.enabled || segments.len() < min_run {
        return 0;
    }

    let mut out = Vec::with_capacity(segments.len());
    let mut made = 0;
    let mut i = 0;
    while i < segments.len() {
        let end = run_end(segments, i, settings);
        if end - i >= min_run {
            if let Some(arc) = fit_run(&segments[i..end], settings) {
                out.push(arc);
                made += 1;
                i = end;
                continue;
            }
        }
        out.push(segments[i].clone());
        i += 1;
    }
    *segments = out;
    made
}

fn eligible(s: &Segment) -> bool {
    s.arc.is_none()
        && !s.is_move()
        && !s.is_command()
        && !s.has_absolute_extrusion()
        && s.length() > Tolerance::TOOLPATH.linear
}

fn compatible(a: &Segment, b: &Segment) -> bool {
    (a.speed - b.speed).abs() < 1e-9
        && (a.feed_ratio - b.feed_ratio).abs() < 1e-9
        && a.area == b.area
        && a.extruder_id == b.extruder_id
        && a.lift == b.lift
        && Tolerance::TOOLPATH.points_equal_2d(&a.to, &b.from)
}

/// Exclusive end of the arc-compatible run starting at `start`.
fn run_end(segments: &[Segment], start: usize, settings: &ArcSettings) -> usize {
    if !eligible(&segments[start]) {
        return start + 1;
    }
    let (min_turn, max_angle) = (settings.min_turn(), settings.max_angle());
    let mut sign = 0.0;
    let mut center: Option<Point2> = None;
    let mut j = start + 1;
    while j < segments.len() {
        let (prev, cur) = (&segments[j - 1], &segments[j]);
        if !eligible(cur) || !compatible(prev, cur) {
            break;
        }
        let turn = turn_angle(&prev.dir(), &cur.dir());
        if turn.abs() <= min_turn || turn.abs() >= max_angle {
            break;
        }
        if sign != 0.0 && turn.signum() != sign {
            break;
        }
        let Some(c) = circumcenter(&prev.from, &prev.to, &cur.to) else {
            break;
        };
        match center {
            Some(c0) => {
                let r2 = (prev.from - c0).norm_squared();
                if (c - c0).norm_squared() > settings.center_tolerance * r2 {
                    break;
                }
            }
            None => center = Some(c),
        }
        sign = turn.signum();
        j += 1;
    }
    j
}

/// Single arc replacing `run`, if all its vertices lie on one circle.
fn fit_run(run: &[Segment], settings: &ArcSettings) -> Option<Segment> {
    let m = run.len();
    let first = &run[0];
    let start = first.from;
    let end = run[m - 1].to;
    let vertices: Vec<Point2> = std::iter::once(start).chain(run.iter().map(|s| s.to)).collect();
    let closed = Tolerance::TOOLPATH.points_equal_2d(&start, &end);

    let mid = vertices[m / 2];
    let center = if closed {
        let aux = vertices[(m / 2 + m + 1) / 2];
        bisector_intersection(&start, &mid, &mid, &aux)?
    } else {
        circumcenter(&start, &mid, &end)?
    };

    let radius = (start - center).norm();
    if radius <= Tolerance::TOOLPATH.linear {
        return None;
    }
    if vertices
        .iter()
        .any(|v| ((v - center).norm() - radius).abs() > settings.radius_tolerance)
    {
        return None;
    }

    let direction = ArcDirection::from_turn(turn_angle(&run[0].dir(), &run[1].dir()));
    let arc = Arc::through(&start, &end, center, direction);
    let chords: f64 = vertices
        .windows(2)
        .map(|w| turn_angle(&(w[0] - center), &(w[1] - center)).abs())
        .sum();
    if (arc.angle - chords).abs() > SWEEP_TOLERANCE {
        return None;
    }

    Some(Segment::arc(
        first.area,
        first.extruder_id,
        start,
        end,
        first.speed,
        first.feed_ratio,
        center,
        direction,
    ))
}
