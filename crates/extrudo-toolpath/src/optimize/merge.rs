//! Merge near-parallel neighboring lines into one wider line.

use extrudo_math::{cross, midpoint, point_line_distance, Point2, Tolerance, Vec2};

use crate::segment::Segment;

/// Largest `|sin|` of the angle between two lines that still count as parallel.
const PARALLEL_SIN: f64 = 0.1;

/// How many following segments are checked for a merge partner.
const LOOKAHEAD: usize = 2;

/// Merge lines closer than `max_distance`; returns the number of merges.
///
/// The first line of a pair moves onto the midline and takes over the
/// partner's material (`feed_i·L_i + feed_j·L_j` spread over `L_i`); the
/// partner becomes a travel. Straight neighbors sharing an endpoint with the
/// moved line follow it and keep their material. A distance of zero
/// disables merging.
pub fn merge_close_lines(segments: &mut [Segment], max_distance: f64) -> usize {
    if max_distance <= 0.0 {
        return 0;
    }
    let n = segments.len();
    let mut merged = 0;
    for i in 0..n {
        for j in (i + 1)..(i + 1 + LOOKAHEAD).min(n) {
            if try_merge(segments, i, j, max_distance) {
                merged += 1;
                break;
            }
        }
    }
    merged
}

fn mergeable(s: &Segment) -> bool {
    s.arc.is_none() && !s.is_move() && !s.is_command() && !s.has_absolute_extrusion()
}

fn try_merge(segments: &mut [Segment], i: usize, j: usize, max_distance: f64) -> bool {
    let (a, b) = (&segments[i], &segments[j]);
    if !mergeable(a) || !mergeable(b) || a.area != b.area || a.extruder_id != b.extruder_id {
        return false;
    }
    let (len_a, len_b) = (a.length(), b.length());
    if len_a <= 0.0 || len_b <= 0.0 {
        return false;
    }
    let (da, db) = (a.dir(), b.dir());
    if cross(&da, &db).abs() / (len_a * len_b) > PARALLEL_SIN {
        return false;
    }
    let mid_b = midpoint(&b.from, &b.to);
    if point_line_distance(&mid_b, &a.from, &a.to) >= max_distance {
        return false;
    }

    // The lines must lie side by side, not end to end.
    let axis = da / len_a;
    let tb0 = (b.from - a.from).dot(&axis);
    let tb1 = (b.to - a.from).dot(&axis);
    let overlap = tb0.max(tb1).min(len_a) - tb0.min(tb1).max(0.0);
    if overlap < 0.5 * len_a.min(len_b) {
        return false;
    }

    let normal = Vec2::new(-axis.y, axis.x);
    let shift = normal * ((mid_b - a.from).dot(&normal) / 2.0);
    let feed = (a.feed_ratio * len_a + b.feed_ratio * len_b) / len_a;

    let (old_from, old_to) = (a.from, a.to);
    let a = &mut segments[i];
    a.from += shift;
    a.to += shift;
    a.feed_ratio = feed;
    let (new_from, new_to) = (a.from, a.to);
    segments[j].feed_ratio = 0.0;

    if i > 0 {
        reattach(&mut segments[i - 1], true, &old_from, new_from);
    }
    if i + 1 < segments.len() {
        reattach(&mut segments[i + 1], false, &old_to, new_to);
    }
    true
}

/// Move the end (or start) of `s` from `old` to `new` if they coincide.
fn reattach(s: &mut Segment, at_end: bool, old: &Point2, new: Point2) {
    if s.arc.is_some() || s.is_command() {
        return;
    }
    let tol = Tolerance::TOOLPATH;
    let shared = if at_end { &s.to } else { &s.from };
    if !tol.points_equal_2d(shared, old) {
        return;
    }

    let mut moved = s.clone();
    if at_end {
        moved.to = new;
    } else {
        moved.from = new;
    }
    let length = moved.length();
    if !moved.is_move() {
        // a vanishing printed neighbor would drop its material
        if length <= tol.linear {
            return;
        }
        moved.feed_ratio = s.feed_ratio * s.length() / length;
    }
    *s = moved;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Area;
    use approx::assert_abs_diff_eq;
    use extrudo_math::Point2;

    fn line(from: (f64, f64), to: (f64, f64)) -> Segment {
        Segment::line(Area::Infill, 0, Point2::new(from.0, from.1), Point2::new(to.0, to.1), 40.0, 1.0)
    }

    #[test]
    fn test_zigzag_pair_merged() {
        let mut segs = vec![
            line((0.0, 0.0), (10.0, 0.0)),
            line((10.0, 0.0), (10.0, 0.2)),
            line((10.0, 0.2), (0.0, 0.2)),
        ];
        let merged = merge_close_lines(&mut segs, 0.3);
        assert_eq!(merged, 1);
        assert_abs_diff_eq!(segs[0].from.y, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(segs[0].to.y, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(segs[0].feed_ratio, 2.0, epsilon = 1e-12);
        assert!(segs[2].is_move());
        assert!(!segs[1].is_move());
    }

    #[test]
    fn test_neighbors_follow_moved_line() {
        let mut segs = vec![
            line((0.0, -0.2), (0.0, 0.0)),
            line((0.0, 0.0), (10.0, 0.0)),
            line((10.0, 0.0), (10.0, 0.2)),
            line((10.0, 0.2), (0.0, 0.2)),
        ];
        let before: f64 = segs.iter().map(|s| s.length() * s.feed_ratio).sum();
        assert_eq!(merge_close_lines(&mut segs, 0.3), 1);

        // no gaps inside the run
        for pair in segs.windows(2) {
            assert_abs_diff_eq!(pair[0].to.x, pair[1].from.x, epsilon = 1e-12);
            assert_abs_diff_eq!(pair[0].to.y, pair[1].from.y, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(segs[0].to.y, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(segs[0].feed_ratio, 0.2 / 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(segs[2].from.y, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(segs[2].feed_ratio, 2.0, epsilon = 1e-12);

        let after: f64 = segs.iter().map(|s| s.length() * s.feed_ratio).sum();
        assert_abs_diff_eq!(before, after, epsilon = 1e-9);
    }

    #[test]
    fn test_material_preserved() {
        let mut segs = vec![line((0.0, 0.0), (10.0, 0.0)), line((10.0, 0.1), (2.0, 0.1))];
        let before: f64 = segs.iter().map(|s| s.length() * s.feed_ratio).sum();
        assert_eq!(merge_close_lines(&mut segs, 0.3), 1);
        let after: f64 = segs.iter().map(|s| s.length() * s.feed_ratio).sum();
        assert_abs_diff_eq!(before, after, epsilon = 1e-9);
    }

    #[test]
    fn test_end_to_end_not_merged() {
        let mut segs = vec![line((0.0, 0.0), (10.0, 0.0)), line((10.0, 0.0), (20.0, 0.0))];
        assert_eq!(merge_close_lines(&mut segs, 0.3), 0);
    }

    #[test]
    fn test_far_lines_not_merged() {
        let mut segs = vec![line((0.0, 0.0), (10.0, 0.0)), line((10.0, 1.0), (0.0, 1.0))];
        assert_eq!(merge_close_lines(&mut segs, 0.3), 0);
    }

    #[test]
    fn test_disabled() {
        let mut segs = vec![line((0.0, 0.0), (10.0, 0.0)), line((10.0, 0.1), (0.0, 0.1))];
        assert_eq!(merge_close_lines(&mut segs, 0.0), 0);
        assert!(!segs[1].is_move());
    }
}
