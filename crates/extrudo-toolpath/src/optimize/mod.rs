//! Segment-list rewrites applied between building and lifting.
//!
//! Passes run in a fixed order: arc fitting, corner capping, line merging,
//! travel clipping and layer slowdown. Each pass is independent and can be
//! called on its own.

pub mod arcs;
pub mod clip;
pub mod corners;
pub mod merge;
pub mod slowdown;

pub use arcs::fit_arcs;
pub use clip::clip_movements;
pub use corners::cap_corners;
pub use merge::merge_close_lines;
pub use slowdown::{set_speed_factor, slow_down_to};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::path::Polygon;
use crate::segment::Segment;
use crate::settings::EngineSettings;

/// Endpoint distance under which a travel counts as starting on a contour.
pub const CLIP_MAX_ERROR: f64 = 0.01;

/// What the optimizer changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizeReport {
    /// Arcs fitted.
    pub arcs: usize,
    /// Corners capped.
    pub corners_capped: usize,
    /// Line pairs merged.
    pub lines_merged: usize,
    /// Travels rerouted.
    pub moves_clipped: usize,
    /// Applied slowdown factor (1.0 = none).
    pub slowdown_factor: f64,
}

/// Run every enabled pass over `segments`.
///
/// `contours` are the layer's polygons, used to keep travels in material.
pub fn optimize(segments: &mut Vec<Segment>, contours: &[Polygon], settings: &EngineSettings) -> OptimizeReport {
    let arcs = fit_arcs(segments, &settings.arcs);
    let corners_capped = cap_corners(segments, &settings.corners);
    let lines_merged = merge_close_lines(segments, settings.merge_distance);
    let moves_clipped = if settings.clip_movements {
        clip_movements(segments, contours, CLIP_MAX_ERROR)
    } else {
        0
    };
    let slowdown_factor = slow_down_to(segments, settings.cooling.min_layer_time);

    let report = OptimizeReport {
        arcs,
        corners_capped,
        lines_merged,
        moves_clipped,
        slowdown_factor,
    };
    debug!(?report, "optimized segments");
    report
}
