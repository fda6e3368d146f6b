//! Per-layer pipeline: build, optimize, lift and compensate.

use extrudo_math::{lift, Point2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::antiooze::{apply_antiooze, AntioozeReport};
use crate::builder::build;
use crate::error::Result;
use crate::optimize::{optimize, OptimizeReport};
use crate::path::{Polygon, PolygonSpec, PrintPolygon};
use crate::progress::Progress;
use crate::segment3::{lift_segments, total_extrusion, total_seconds, Segment3};
use crate::settings::EngineSettings;

/// One layer's input.
#[derive(Debug, Clone, Default)]
pub struct LayerInput {
    /// Layer index.
    pub index: usize,
    /// Z height (mm), before the global offset.
    pub z: f64,
    /// Contours to print.
    pub polygons: Vec<PrintPolygon>,
    /// Machine commands issued before the layer's first motion.
    pub commands: Vec<String>,
}

/// Serializable layer description read by drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Z height (mm).
    pub z: f64,
    /// Contours.
    #[serde(default)]
    pub polygons: Vec<PolygonSpec>,
    /// Commands issued at layer start.
    #[serde(default)]
    pub commands: Vec<String>,
}

impl LayerSpec {
    /// Convert to engine input.
    pub fn to_input(&self, index: usize) -> LayerInput {
        LayerInput {
            index,
            z: self.z,
            polygons: self.polygons.iter().map(PrintPolygon::from).collect(),
            commands: self.commands.clone(),
        }
    }
}

/// Numbers describing one processed layer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LayerStats {
    /// Segments in the final list.
    pub segment_count: usize,
    /// Estimated time in seconds.
    pub print_seconds: f64,
    /// Time spent extruding in seconds.
    pub extruding_seconds: f64,
    /// Net filament in mm.
    pub filament_mm: f64,
    /// Optimizer changes.
    pub optimize: OptimizeReport,
    /// Anti-ooze changes.
    pub antiooze: AntioozeReport,
}

/// A processed layer ready for emission.
#[derive(Debug, Clone)]
pub struct LayerToolpath {
    /// Layer index.
    pub index: usize,
    /// Absolute Z (mm), offset included.
    pub z: f64,
    /// Final segments.
    pub segments: Vec<Segment3>,
    /// Nozzle position after the layer.
    pub end_point: Point2,
    /// Statistics.
    pub stats: LayerStats,
}

/// Statistics about a whole print.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrintStats {
    /// Total number of layers.
    pub layer_count: usize,
    /// Estimated print time in seconds.
    pub print_time_seconds: f64,
    /// Total filament length in mm.
    pub filament_mm: f64,
    /// Travels with retract/push compensation.
    pub retract_cycles: usize,
    /// Arcs fitted.
    pub arcs: usize,
    /// Layers that had to be slowed down for cooling.
    pub slowed_layers: usize,
}

impl PrintStats {
    fn add(&mut self, stats: &LayerStats) {
        self.layer_count += 1;
        self.print_time_seconds += stats.print_seconds;
        self.filament_mm += stats.filament_mm;
        self.retract_cycles += stats.antiooze.ranges;
        self.arcs += stats.optimize.arcs;
        if stats.optimize.slowdown_factor < 1.0 {
            self.slowed_layers += 1;
        }
    }
}

/// Turn one layer's contours into final 3D segments.
pub fn process_layer(
    input: &LayerInput,
    start: Point2,
    settings: &EngineSettings,
    progress: &dyn Progress,
) -> Result<LayerToolpath> {
    let built = build(
        &input.polygons,
        start,
        &settings.builder,
        settings.speeds.move_speed,
        progress,
    )?;
    let mut segments = built.segments;

    let contours: Vec<Polygon> = input.polygons.iter().map(|p| p.polygon.clone()).collect();
    let optimized = optimize(&mut segments, &contours, settings);
    if optimized.slowdown_factor < 1.0 && optimized.slowdown_factor * settings.speeds.max_print_speed < settings.speeds.min_print_speed {
        warn!(
            layer = input.index,
            factor = optimized.slowdown_factor,
            "slowdown reaches below the minimum print speed"
        );
    }

    let z = input.z + settings.z_offset;
    let mut lines: Vec<Segment3> = input
        .commands
        .iter()
        .map(|c| Segment3::command(c.as_str(), 0, lift(&start, z)))
        .collect();
    lines.extend(lift_segments(&segments, z, settings.extrusion_per_mm));

    let antiooze = apply_antiooze(&mut lines, &settings.antiooze, progress)?;

    let stats = LayerStats {
        segment_count: lines.len(),
        print_seconds: total_seconds(&lines),
        extruding_seconds: lines.iter().filter(|l| !l.is_move()).map(Segment3::time).sum(),
        filament_mm: total_extrusion(&lines),
        optimize: optimized,
        antiooze,
    };
    info!(
        layer = input.index,
        z,
        segments = stats.segment_count,
        seconds = stats.print_seconds,
        "layer processed"
    );

    Ok(LayerToolpath {
        index: input.index,
        z,
        segments: lines,
        end_point: built.end_point,
        stats,
    })
}

/// Process layers in order; each layer starts where the previous one ended.
pub fn process_layers(
    layers: &[LayerInput],
    start: Point2,
    settings: &EngineSettings,
    progress: &dyn Progress,
) -> Result<(Vec<LayerToolpath>, PrintStats)> {
    settings.validate()?;

    let mut at = start;
    let mut out = Vec::with_capacity(layers.len());
    let mut stats = PrintStats::default();
    for layer in layers {
        let toolpath = process_layer(layer, at, settings, progress)?;
        at = toolpath.end_point;
        stats.add(&toolpath.stats);
        out.push(toolpath);
    }
    Ok((out, stats))
}
