//! Machine-level motion directives.

use extrudo_math::{Point3, Vec2};
use extrudo_toolpath::ArcDirection;
use serde::{Deserialize, Serialize};

/// One machine instruction. Speeds are in mm/s, extrusion in mm of filament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Directive {
    /// Non-extruding motion.
    Move {
        /// Destination.
        target: Point3,
        /// Feed rate.
        speed: f64,
    },
    /// Straight extruding motion.
    Line {
        /// Destination.
        target: Point3,
        /// Feed rate.
        speed: f64,
        /// Filament moved (negative retracts).
        extrusion: f64,
    },
    /// Circular extruding motion in the XY plane.
    Arc {
        /// Rotation sense.
        direction: ArcDirection,
        /// Center relative to the start point (I/J).
        center_offset: Vec2,
        /// Destination.
        target: Point3,
        /// Feed rate.
        speed: f64,
        /// Filament moved.
        extrusion: f64,
    },
    /// Opaque machine command.
    Command {
        /// Command text.
        label: String,
    },
}

impl Directive {
    /// Where the tool ends up, if the directive moves it.
    pub fn target(&self) -> Option<Point3> {
        match self {
            Directive::Move { target, .. } | Directive::Line { target, .. } | Directive::Arc { target, .. } => {
                Some(*target)
            }
            Directive::Command { .. } => None,
        }
    }

    /// Filament moved by this directive.
    pub fn extrusion(&self) -> f64 {
        match self {
            Directive::Line { extrusion, .. } | Directive::Arc { extrusion, .. } => *extrusion,
            _ => 0.0,
        }
    }

    /// Feed rate, if the directive moves the tool.
    pub fn speed(&self) -> Option<f64> {
        match self {
            Directive::Move { speed, .. } | Directive::Line { speed, .. } | Directive::Arc { speed, .. } => Some(*speed),
            Directive::Command { .. } => None,
        }
    }
}
