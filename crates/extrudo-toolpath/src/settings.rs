//! Engine configuration.
//!
//! Every group deserializes with `#[serde(default)]`, so a configuration
//! file only needs to name the values it changes. Angles are given in
//! degrees; the accessors convert to radians.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Path builder options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderSettings {
    /// Start the first polygon one vertex after its nearest vertex.
    pub displace_start: bool,
    /// Break distance ties by similar average edge length.
    pub prefer_similar_edges: bool,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            displace_start: false,
            prefer_similar_edges: true,
        }
    }
}

/// Speed limits (mm/s).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedSettings {
    /// Slowest extruding speed.
    pub min_print_speed: f64,
    /// Fastest extruding speed.
    pub max_print_speed: f64,
    /// Travel speed.
    pub move_speed: f64,
}

impl Default for SpeedSettings {
    fn default() -> Self {
        Self {
            min_print_speed: 10.0,
            max_print_speed: 80.0,
            move_speed: 150.0,
        }
    }
}

/// Arc fitting options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcSettings {
    /// Replace runs of short lines by arcs.
    pub enabled: bool,
    /// Largest turn between two consecutive lines of a run (degrees).
    pub max_angle_deg: f64,
    /// Smallest turn that still counts as curvature (degrees).
    pub min_turn_deg: f64,
    /// Allowed squared drift of the center, relative to the squared radius.
    pub center_tolerance: f64,
    /// Allowed distance of run vertices from the fitted circle (mm).
    pub radius_tolerance: f64,
    /// Minimum number of lines in a run.
    pub min_segments: usize,
}

impl ArcSettings {
    /// Largest turn between two lines, in radians.
    pub fn max_angle(&self) -> f64 {
        self.max_angle_deg.to_radians()
    }

    /// Smallest turn counted as curvature, in radians.
    pub fn min_turn(&self) -> f64 {
        self.min_turn_deg.to_radians()
    }
}

impl Default for ArcSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_angle_deg: 30.0,
            min_turn_deg: 0.05,
            center_tolerance: 0.01,
            radius_tolerance: 0.01,
            min_segments: 3,
        }
    }
}

/// Corner capping options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerSettings {
    /// Blunt sharp corners.
    pub enabled: bool,
    /// Extrusion line width (mm).
    pub line_width: f64,
    /// Cut length per unit of `line_width × tan(turn/2)`.
    pub cap_ratio: f64,
    /// Lines shorter than this are never cut (mm).
    pub min_length: f64,
    /// Only corners turning more than this are capped (degrees).
    pub min_angle_deg: f64,
    /// Upper bound on capping passes.
    pub max_passes: usize,
}

impl CornerSettings {
    /// Minimum capped turn in radians.
    pub fn min_angle(&self) -> f64 {
        self.min_angle_deg.to_radians()
    }
}

impl Default for CornerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            line_width: 0.45,
            cap_ratio: 1.0,
            min_length: 1.0,
            min_angle_deg: 60.0,
            max_passes: 4,
        }
    }
}

/// Retract/re-push compensation around long travels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntioozeSettings {
    /// Compensate oozing.
    pub enabled: bool,
    /// Travels shorter than this are left alone (mm).
    pub min_distance: f64,
    /// Filament retracted before a travel (mm of filament, positive).
    pub amount: f64,
    /// Filament speed while retracting/pushing (mm/s).
    pub speed: f64,
    /// Z lift during compensated travels (mm, 0 disables).
    pub z_lift: f64,
    /// Re-pushed amount relative to the retracted amount.
    pub repush_ratio: f64,
    /// Spread the filament motion over neighboring lines; halts only when off.
    pub distribute: bool,
}

impl AntioozeSettings {
    /// Filament pushed back after a travel.
    pub fn push_amount(&self) -> f64 {
        self.amount * self.repush_ratio
    }
}

impl Default for AntioozeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_distance: 4.5,
            amount: 1.0,
            speed: 30.0,
            z_lift: 0.0,
            repush_ratio: 1.0,
            distribute: true,
        }
    }
}

/// Layer cooling options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoolingSettings {
    /// Minimum extruding time per layer (s, 0 disables).
    pub min_layer_time: f64,
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Path builder.
    pub builder: BuilderSettings,
    /// Speed limits.
    pub speeds: SpeedSettings,
    /// Arc fitting.
    pub arcs: ArcSettings,
    /// Corner capping.
    pub corners: CornerSettings,
    /// Merge near-parallel lines closer than this (mm, 0 disables).
    pub merge_distance: f64,
    /// Keep travels out of holes.
    pub clip_movements: bool,
    /// Anti-ooze compensation.
    pub antiooze: AntioozeSettings,
    /// Cooling.
    pub cooling: CoolingSettings,
    /// Filament per mm of path at feed ratio 1.
    pub extrusion_per_mm: f64,
    /// Global Z offset added to every layer height (mm).
    pub z_offset: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            builder: BuilderSettings::default(),
            speeds: SpeedSettings::default(),
            arcs: ArcSettings::default(),
            corners: CornerSettings::default(),
            merge_distance: 0.0,
            clip_movements: true,
            antiooze: AntioozeSettings::default(),
            cooling: CoolingSettings::default(),
            extrusion_per_mm: extrusion_per_mm(0.45, 0.2, 1.75),
            z_offset: 0.0,
        }
    }
}

impl EngineSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        let speeds = &self.speeds;
        if speeds.min_print_speed <= 0.0 || speeds.move_speed <= 0.0 {
            return Err(EngineError::InvalidSettings(
                "print and move speeds must be positive".into(),
            ));
        }
        if speeds.max_print_speed < speeds.min_print_speed {
            return Err(EngineError::InvalidSettings(
                "max_print_speed must not be below min_print_speed".into(),
            ));
        }
        if self.arcs.enabled && (self.arcs.max_angle_deg <= self.arcs.min_turn_deg || self.arcs.max_angle_deg > 180.0) {
            return Err(EngineError::InvalidSettings(
                "arc max_angle_deg must be above min_turn_deg and at most 180".into(),
            ));
        }
        if self.corners.enabled && (self.corners.line_width <= 0.0 || self.corners.cap_ratio < 0.0) {
            return Err(EngineError::InvalidSettings(
                "corner line_width must be positive and cap_ratio non-negative".into(),
            ));
        }
        let ao = &self.antiooze;
        if ao.enabled {
            if ao.speed <= 0.0 {
                return Err(EngineError::InvalidSettings("antiooze speed must be positive".into()));
            }
            if ao.amount < 0.0 || ao.repush_ratio <= 0.0 || ao.z_lift < 0.0 {
                return Err(EngineError::InvalidSettings(
                    "antiooze amount, repush_ratio and z_lift must not be negative".into(),
                ));
            }
        }
        if self.extrusion_per_mm < 0.0 || self.cooling.min_layer_time < 0.0 || self.merge_distance < 0.0 {
            return Err(EngineError::InvalidSettings(
                "extrusion_per_mm, min_layer_time and merge_distance must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Filament length per mm of path for a rectangular bead.
pub fn extrusion_per_mm(line_width: f64, layer_height: f64, filament_diameter: f64) -> f64 {
    let filament_area = std::f64::consts::PI * (filament_diameter / 2.0).powi(2);
    if filament_area <= 0.0 {
        return 0.0;
    }
    line_width * layer_height / filament_area
}
