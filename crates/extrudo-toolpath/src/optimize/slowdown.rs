//! Layer-time based slowdown.

use crate::segment::{total_seconds_extruding, Segment};

/// Factors this close to 1 leave the speeds alone.
const FACTOR_EPS: f64 = 1e-9;

/// Scale the speed of every extruding segment by `factor`.
pub fn set_speed_factor(segments: &mut [Segment], factor: f64) {
    for s in segments.iter_mut().filter(|s| !s.is_move()) {
        s.speed *= factor;
    }
}

/// Slow extruding segments so the layer takes at least `target_seconds`.
///
/// Returns the applied factor, 1.0 when the layer is already slow enough.
/// Travels keep their speed. Running it twice changes nothing.
pub fn slow_down_to(segments: &mut [Segment], target_seconds: f64) -> f64 {
    if target_seconds <= 0.0 {
        return 1.0;
    }
    let current = total_seconds_extruding(segments);
    if current <= 0.0 {
        return 1.0;
    }
    let factor = current / target_seconds;
    if factor < 1.0 - FACTOR_EPS {
        set_speed_factor(segments, factor);
        factor
    } else {
        1.0
    }
}
