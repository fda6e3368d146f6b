//! Retract before and re-push after long travels.
//!
//! The retract is spread over the extruding lines right before a travel and
//! the push over the lines right after it, so the filament motion overlaps
//! with printing instead of stopping the head. When there is not enough
//! printing time around the travel, the neighboring lines are slowed down;
//! when there is none at all, a stationary halt is inserted. With
//! distribution turned off every travel gets a halt on both sides.

use extrudo_math::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::progress::Progress;
use crate::segment::EXTRUSION_EPS;
use crate::segment3::{divide_at, range_length, Segment3};
use crate::settings::AntioozeSettings;

/// Travels handled between two progress checks.
const PROGRESS_INTERVAL: usize = 20;

/// The last window segment is split only when it carries less than this
/// share of its capacity.
const SPLIT_FRACTION: f64 = 0.9;

/// Index span of one compensated travel.
///
/// `tract_start..move_start` is the retract window, `move_start..=move_end`
/// the travel itself and `move_end + 1..=push_end` the push window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRange {
    /// First segment of the retract window (`== move_start` when empty).
    pub tract_start: usize,
    /// First travel segment.
    pub move_start: usize,
    /// Last travel segment.
    pub move_end: usize,
    /// Last segment of the push window (`== move_end` when empty).
    pub push_end: usize,
}

impl MoveRange {
    /// Shift everything after the retract window start.
    fn shift_move(&mut self, by: usize) {
        self.move_start += by;
        self.move_end += by;
        self.push_end += by;
    }
}

/// Window side relative to the travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Retract,
    Push,
}

/// Statistics of one anti-ooze run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AntioozeReport {
    /// Travels compensated.
    pub ranges: usize,
    /// Halts inserted.
    pub halts: usize,
    /// Window segments split.
    pub splits: usize,
    /// Windows slowed down to fit the filament motion.
    pub slowed_windows: usize,
}

/// Next travel at or after `from` that is at least `min_distance` long.
///
/// Consecutive travels (and commands between them) form one range. Windows
/// grow over plain extruding segments and commands, never past `from`.
pub fn find_move_range(lines: &[Segment3], from: usize, min_distance: f64) -> Option<MoveRange> {
    scan_move_range(lines, from, from, min_distance)
}

/// Like [`find_move_range`], with the retract window bounded by `floor`
/// instead of the scan start.
fn scan_move_range(lines: &[Segment3], from: usize, floor: usize, min_distance: f64) -> Option<MoveRange> {
    let n = lines.len();
    let mut i = from;
    while i < n {
        let start = (i..n).find(|&k| lines[k].is_move())?;
        let mut end = start;
        let mut k = start;
        while k < n && (lines[k].is_move() || lines[k].is_command()) {
            if lines[k].is_move() {
                end = k;
            }
            k += 1;
        }

        if range_length(lines, start, end) >= min_distance {
            let window = |l: &Segment3| l.is_plain_extrusion() || l.is_command();

            let mut tract_start = start;
            while tract_start > floor && window(&lines[tract_start - 1]) {
                tract_start -= 1;
            }
            while tract_start < start && lines[tract_start].is_command() {
                tract_start += 1;
            }

            let mut push_end = end;
            while push_end + 1 < n && window(&lines[push_end + 1]) {
                push_end += 1;
            }
            while push_end > end && lines[push_end].is_command() {
                push_end -= 1;
            }

            return Some(MoveRange {
                tract_start,
                move_start: start,
                move_end: end,
                push_end,
            });
        }
        i = end + 1;
    }
    None
}

/// Apply retract/push compensation to a lifted layer.
///
/// Total absolute extrusion changes by `amount × (repush_ratio − 1)` per
/// compensated travel, which is zero with the default ratio.
pub fn apply_antiooze(
    lines: &mut Vec<Segment3>,
    settings: &AntioozeSettings,
    progress: &dyn Progress,
) -> Result<AntioozeReport> {
    let mut report = AntioozeReport::default();
    if !settings.enabled
        || lines.is_empty()
        || settings.min_distance <= 0.0
        || settings.amount.abs() < EXTRUSION_EPS
        || settings.speed <= 0.0
    {
        return Ok(report);
    }

    // The push window of one travel runs up to the next one, so the next
    // retract window may reach back over its unused part.
    let (mut cursor, mut floor) = (0, 0);
    while let Some(mut range) = scan_move_range(lines, cursor, floor, settings.min_distance) {
        if report.ranges % PROGRESS_INTERVAL == 0 && !progress.update("antiooze", range.move_start, lines.len()) {
            return Err(EngineError::Cancelled("anti-ooze"));
        }

        if settings.z_lift > 0.0 {
            for line in &mut lines[range.move_start..=range.move_end] {
                if line.is_move() {
                    line.lift = settings.z_lift;
                }
            }
        }

        // Push first so the retract window indices stay valid.
        let pushed = distribute(lines, &range, Side::Push, settings.push_amount(), settings, &mut report);
        range.push_end += pushed;
        let retracted = distribute(lines, &range, Side::Retract, -settings.amount, settings, &mut report);
        range.shift_move(retracted);

        report.ranges += 1;
        floor = range.move_end + 1;
        cursor = range.push_end + 1;
    }

    debug!(
        ranges = report.ranges,
        halts = report.halts,
        splits = report.splits,
        slowed = report.slowed_windows,
        "applied anti-ooze"
    );
    Ok(report)
}

/// Spread `amount` over one window; returns how many segments were inserted.
fn distribute(
    lines: &mut Vec<Segment3>,
    range: &MoveRange,
    side: Side,
    amount: f64,
    settings: &AntioozeSettings,
    report: &mut AntioozeReport,
) -> usize {
    if amount.abs() < EXTRUSION_EPS {
        return 0;
    }
    // Ordered from the travel outward.
    let window: Vec<usize> = match side {
        Side::Push => (range.move_end + 1..=range.push_end).collect(),
        Side::Retract => (range.tract_start..range.move_start).rev().collect(),
    };
    let available: f64 = window.iter().map(|&i| lines[i].time()).sum();

    if !settings.distribute || window.is_empty() || available <= 0.0 {
        insert_halt(lines, range, side, amount, settings);
        report.halts += 1;
        return 1;
    }

    let needed = amount.abs() / settings.speed;
    if available <= needed {
        let factor = available / needed;
        for &i in &window {
            let share = lines[i].time() / available;
            lines[i].add_absolute_extrusion(amount * share);
            lines[i].speed *= factor;
        }
        report.slowed_windows += 1;
        return 0;
    }

    let sign = amount.signum();
    let mut remaining = amount.abs();
    for &i in &window {
        let capacity = lines[i].max_absolute_amount(settings.speed);
        if capacity <= 0.0 {
            continue;
        }
        if capacity < remaining {
            lines[i].add_absolute_extrusion(sign * capacity);
            remaining -= capacity;
            continue;
        }

        let fraction = remaining / capacity;
        if fraction >= SPLIT_FRACTION {
            lines[i].add_absolute_extrusion(sign * remaining);
            return 0;
        }
        let length = lines[i].length();
        let at = match side {
            Side::Push => fraction * length,
            Side::Retract => (1.0 - fraction) * length,
        };
        if divide_at(lines, i, at) == 0 {
            lines[i].add_absolute_extrusion(sign * remaining);
            return 0;
        }
        let near = match side {
            Side::Push => i,
            Side::Retract => i + 1,
        };
        lines[near].add_absolute_extrusion(sign * remaining);
        report.splits += 1;
        return 1;
    }

    // Rounding left a sliver; put it next to the travel.
    if remaining > EXTRUSION_EPS {
        if let Some(&nearest) = window.first() {
            lines[nearest].add_absolute_extrusion(sign * remaining);
        }
    }
    0
}

/// Stationary (or purely vertical, with Z lift) filament motion at the travel.
fn insert_halt(lines: &mut Vec<Segment3>, range: &MoveRange, side: Side, amount: f64, settings: &AntioozeSettings) {
    let travel = &lines[range.move_start];
    let (area, extruder_id) = (travel.area, travel.extruder_id);
    let (index, base) = match side {
        Side::Push => (range.move_end + 1, lines[range.move_end].to),
        Side::Retract => (range.move_start, travel.from),
    };

    let lift = settings.z_lift;
    let halt = if lift > 0.0 {
        let up = base + Vec3::new(0.0, 0.0, lift);
        let speed = (lift * settings.speed / amount).abs();
        match side {
            Side::Retract => Segment3::halt(area, extruder_id, base, up, speed, amount),
            Side::Push => Segment3::halt(area, extruder_id, up, base, speed, amount),
        }
    } else {
        Segment3::halt(area, extruder_id, base, base, settings.speed, amount)
    };
    lines.insert(index, halt);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelFlag, NoProgress};
    use crate::segment::Area;
    use crate::segment3::total_absolute_extrusion;
    use approx::assert_abs_diff_eq;
    use extrudo_math::Point3;

    fn print(x0: f64, x1: f64, speed: f64) -> Segment3 {
        Segment3::line(
            Area::Shell,
            0,
            Point3::new(x0, 0.0, 0.2),
            Point3::new(x1, 0.0, 0.2),
            speed,
            (x1 - x0).abs() * 0.04,
        )
    }

    fn travel(x0: f64, x1: f64) -> Segment3 {
        Segment3::line(
            Area::Shell,
            0,
            Point3::new(x0, 0.0, 0.2),
            Point3::new(x1, 0.0, 0.2),
            150.0,
            0.0,
        )
    }

    fn settings() -> AntioozeSettings {
        AntioozeSettings {
            enabled: true,
            min_distance: 5.0,
            amount: 1.0,
            speed: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_move_range() {
        let lines = vec![print(0.0, 10.0, 20.0), travel(10.0, 30.0), print(30.0, 40.0, 20.0)];
        let range = find_move_range(&lines, 0, 5.0).unwrap();
        assert_eq!(
            range,
            MoveRange {
                tract_start: 0,
                move_start: 1,
                move_end: 1,
                push_end: 2
            }
        );
        assert!(find_move_range(&lines, 0, 25.0).is_none());
        assert!(find_move_range(&lines, 2, 5.0).is_none());
    }

    #[test]
    fn test_consecutive_moves_form_one_range() {
        let lines = vec![
            print(0.0, 10.0, 20.0),
            travel(10.0, 12.0),
            Segment3::command("M107", 0, Point3::new(12.0, 0.0, 0.2)),
            travel(12.0, 14.0),
            print(14.0, 20.0, 20.0),
        ];
        let range = find_move_range(&lines, 0, 3.0).unwrap();
        assert_eq!(range.move_start, 1);
        assert_eq!(range.move_end, 3);
        assert!(find_move_range(&lines, 0, 5.0).is_none());
    }

    #[test]
    fn test_split_within_window() {
        // 10 mm at 20 mm/s = 0.5 s; the retract needs 0.1 s at 10 mm/s.
        let mut lines = vec![print(0.0, 10.0, 20.0), travel(10.0, 30.0), print(30.0, 40.0, 20.0)];
        let report = apply_antiooze(&mut lines, &settings(), &NoProgress).unwrap();

        assert_eq!(report.ranges, 1);
        assert_eq!(report.splits, 2);
        assert_eq!(report.halts, 0);
        assert_eq!(lines.len(), 5);

        // retract sits on the 2 mm right before the travel
        assert_abs_diff_eq!(lines[1].from.x, 8.0, epsilon = 1e-9);
        assert_abs_diff_eq!(lines[1].absolute_extrusion, -1.0, epsilon = 1e-12);
        assert_eq!(lines[0].absolute_extrusion, 0.0);
        assert!(lines[2].is_move());
        // push sits on the 2 mm right after it
        assert_abs_diff_eq!(lines[3].to.x, 32.0, epsilon = 1e-9);
        assert_abs_diff_eq!(lines[3].absolute_extrusion, 1.0, epsilon = 1e-12);
        assert_eq!(lines[4].absolute_extrusion, 0.0);

        assert_abs_diff_eq!(total_absolute_extrusion(&lines), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lines[1].absolute_extrusion.abs() / lines[1].time(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_short_window_slowed() {
        // 1 mm at 20 mm/s = 0.05 s, half of what the retract needs.
        let mut lines = vec![print(0.0, 1.0, 20.0), travel(1.0, 21.0), print(21.0, 22.0, 20.0)];
        let report = apply_antiooze(&mut lines, &settings(), &NoProgress).unwrap();

        assert_eq!(report.slowed_windows, 2);
        assert_eq!(lines.len(), 3);
        assert_abs_diff_eq!(lines[0].speed, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(lines[0].absolute_extrusion, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lines[2].absolute_extrusion, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lines[0].absolute_extrusion.abs() / lines[0].time(), 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_halts_at_layer_edges() {
        let mut lines = vec![travel(0.0, 20.0)];
        let report = apply_antiooze(&mut lines, &settings(), &NoProgress).unwrap();

        assert_eq!(report.halts, 2);
        assert_eq!(lines.len(), 3);
        assert_abs_diff_eq!(lines[0].absolute_extrusion, -1.0);
        assert_eq!(lines[0].length(), 0.0);
        assert_abs_diff_eq!(lines[0].time(), 0.1, epsilon = 1e-12);
        assert!(lines[1].is_move());
        assert_abs_diff_eq!(lines[2].absolute_extrusion, 1.0);
        assert_eq!(lines[2].from.x, 20.0);
    }

    #[test]
    fn test_z_lift_halts() {
        let mut lines = vec![travel(0.0, 20.0)];
        let ao = AntioozeSettings {
            z_lift: 0.5,
            ..settings()
        };
        apply_antiooze(&mut lines, &ao, &NoProgress).unwrap();

        assert_abs_diff_eq!(lines[0].to.z - lines[0].from.z, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(lines[0].time(), 0.1, epsilon = 1e-12);
        assert_eq!(lines[1].lift, 0.5);
        assert_eq!(lines[1].lifted_from(), lines[0].to);
        assert_eq!(lines[2].from, lines[1].lifted_to());
        assert_abs_diff_eq!(lines[2].to.z, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_short_travel_untouched() {
        let mut lines = vec![print(0.0, 10.0, 20.0), travel(10.0, 12.0), print(12.0, 20.0, 20.0)];
        let original = lines.clone();
        let report = apply_antiooze(&mut lines, &settings(), &NoProgress).unwrap();
        assert_eq!(report.ranges, 0);
        assert_eq!(lines, original);
    }

    #[test]
    fn test_several_travels_conserve_filament() {
        let mut lines = Vec::new();
        for k in 0..30 {
            let x = k as f64 * 30.0;
            lines.push(print(x, x + 10.0, 20.0));
            lines.push(travel(x + 10.0, x + 30.0));
        }
        let report = apply_antiooze(&mut lines, &settings(), &NoProgress).unwrap();
        assert_eq!(report.ranges, 30);
        assert_abs_diff_eq!(total_absolute_extrusion(&lines), 0.0, epsilon = 1e-9);
        assert_eq!(report.halts, 1);
    }

    #[test]
    fn test_retract_reaches_back_over_previous_push_window() {
        let mut lines = vec![
            print(0.0, 10.0, 20.0),
            travel(10.0, 30.0),
            print(30.0, 40.0, 20.0),
            travel(40.0, 60.0),
            print(60.0, 70.0, 20.0),
        ];
        let report = apply_antiooze(&mut lines, &settings(), &NoProgress).unwrap();
        assert_eq!(report.ranges, 2);
        assert_eq!(report.halts, 0);
        assert_eq!(report.splits, 4);

        // middle print: push on 30..32, plain 32..38, retract on 38..40
        let middle: Vec<&Segment3> = lines.iter().filter(|l| l.from.x >= 30.0 && l.to.x <= 40.0).collect();
        assert_eq!(middle.len(), 3);
        assert_abs_diff_eq!(middle[0].absolute_extrusion, 1.0, epsilon = 1e-12);
        assert_eq!(middle[1].absolute_extrusion, 0.0);
        assert_abs_diff_eq!(middle[2].from.x, 38.0, epsilon = 1e-9);
        assert_abs_diff_eq!(middle[2].absolute_extrusion, -1.0, epsilon = 1e-12);
        assert!(lines.iter().all(|l| l.length() > 0.0));
        assert_abs_diff_eq!(total_absolute_extrusion(&lines), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_halts_only_without_distribution() {
        let mut lines = vec![print(0.0, 10.0, 20.0), travel(10.0, 30.0), print(30.0, 40.0, 20.0)];
        let ao = AntioozeSettings {
            distribute: false,
            z_lift: 0.5,
            ..settings()
        };
        let report = apply_antiooze(&mut lines, &ao, &NoProgress).unwrap();

        assert_eq!(report.halts, 2);
        assert_eq!(report.splits, 0);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].absolute_extrusion, 0.0);
        assert_eq!(lines[4].absolute_extrusion, 0.0);

        assert_abs_diff_eq!(lines[1].absolute_extrusion, -1.0);
        assert_abs_diff_eq!(lines[1].to.z - lines[1].from.z, 0.5, epsilon = 1e-12);
        assert_eq!(lines[2].lift, 0.5);
        assert_eq!(lines[2].lifted_from(), lines[1].to);
        assert_abs_diff_eq!(lines[3].absolute_extrusion, 1.0);
        assert_abs_diff_eq!(lines[3].from.z - lines[3].to.z, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_repush_ratio() {
        let mut lines = vec![print(0.0, 10.0, 20.0), travel(10.0, 30.0), print(30.0, 40.0, 20.0)];
        let ao = AntioozeSettings {
            repush_ratio: 1.2,
            ..settings()
        };
        apply_antiooze(&mut lines, &ao, &NoProgress).unwrap();
        assert_abs_diff_eq!(total_absolute_extrusion(&lines), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_disabled_and_cancelled() {
        let mut lines = vec![print(0.0, 10.0, 20.0), travel(10.0, 30.0)];
        let disabled = AntioozeSettings::default();
        assert_eq!(apply_antiooze(&mut lines, &disabled, &NoProgress).unwrap().ranges, 0);

        let flag = CancelFlag::new();
        flag.cancel();
        let err = apply_antiooze(&mut lines, &settings(), &flag).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled(_)));
    }
}
