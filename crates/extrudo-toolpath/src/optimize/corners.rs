//! Blunt sharp corners with a short chamfer line.

use std::f64::consts::PI;

use extrudo_math::{turn_angle, Tolerance};

use crate::segment::Segment;
use crate::settings::CornerSettings;

/// Cap corners until none qualifies or the pass limit is hit.
///
/// Returns the number of chamfers inserted.
pub fn cap_corners(segments: &mut Vec<Segment>, settings: &CornerSettings) -> usize {
    if !settings.enabled || settings.line_width <= 0.0 || settings.cap_ratio <= 0.0 {
        return 0;
    }
    let mut total = 0;
    for _ in 0..settings.max_passes {
        let cuts = cap_pass(segments, settings);
        total += cuts;
        if cuts == 0 {
            break;
        }
    }
    total
}

fn cap_pass(segments: &mut Vec<Segment>, settings: &CornerSettings) -> usize {
    let old = std::mem::take(segments);
    let mut out = Vec::with_capacity(old.len() + old.len() / 4);
    let mut cuts = 0;
    let mut iter = old.into_iter();
    let Some(mut prev) = iter.next() else {
        return 0;
    };
    for mut next in iter {
        let chamfer = cap_corner(&mut prev, &mut next, settings);
        out.push(prev);
        if let Some(chamfer) = chamfer {
            out.push(chamfer);
            cuts += 1;
        }
        prev = next;
    }
    out.push(prev);
    *segments = out;
    cuts
}

/// Shorten `a` and `b` around their shared corner and return the chamfer.
fn cap_corner(a: &mut Segment, b: &mut Segment, settings: &CornerSettings) -> Option<Segment> {
    let printable = |s: &Segment| s.arc.is_none() && !s.is_move() && !s.is_command();
    if !printable(a) || !printable(b) || a.extruder_id != b.extruder_id {
        return None;
    }
    if !Tolerance::TOOLPATH.points_equal_2d(&a.to, &b.from) {
        return None;
    }
    let turn = turn_angle(&a.dir(), &b.dir()).abs();
    if turn <= settings.min_angle() || turn >= PI - Tolerance::TOOLPATH.angular {
        return None;
    }

    let cut = settings.cap_ratio * settings.line_width * (turn / 2.0).tan() / 2.0;
    let (len_a, len_b) = (a.length(), b.length());
    if len_a < settings.min_length || len_b < settings.min_length || cut >= len_a || cut >= len_b {
        return None;
    }

    let p = a.point_at(len_a - cut);
    let q = b.point_at(cut);
    a.to = p;
    b.from = q;
    Some(Segment::line(
        a.area,
        a.extruder_id,
        p,
        q,
        a.speed.min(b.speed),
        a.feed_ratio,
    ))
}
