//! Segments lifted onto an absolute Z plane, carrying final extrusion.

use extrudo_math::{flatten, lift, Point2, Point3, Tolerance, Vec2, Vec3};

use crate::segment::{Arc, Area, Segment, EXTRUSION_EPS};

/// A motion primitive at absolute height with its filament quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment3 {
    /// Feature type.
    pub area: Area,
    /// Start point.
    pub from: Point3,
    /// End point.
    pub to: Point3,
    /// Feed rate (mm/s).
    pub speed: f64,
    /// Filament for the geometric part of the move (mm of filament).
    pub extrusion: f64,
    /// Retract (negative) or push (positive) filament on top of `extrusion`.
    pub absolute_extrusion: f64,
    /// Arc geometry in the XY plane.
    pub arc: Option<Arc>,
    /// Extruder index.
    pub extruder_id: u32,
    /// Z offset applied while traveling.
    pub lift: f64,
    /// Opaque machine command for [`Area::Command`] segments.
    pub command: Option<String>,
}

impl Segment3 {
    /// Lift a planar segment to height `z`.
    ///
    /// The relative extrusion becomes `length × extrusion_per_mm × feed_ratio`.
    pub fn from_segment(segment: &Segment, z: f64, extrusion_per_mm: f64) -> Self {
        Self {
            area: segment.area,
            from: lift(&segment.from, z),
            to: lift(&segment.to, z),
            speed: segment.speed,
            extrusion: segment.length() * extrusion_per_mm * segment.feed_ratio,
            absolute_extrusion: segment.absolute_extrusion,
            arc: segment.arc,
            extruder_id: segment.extruder_id,
            lift: segment.lift,
            command: None,
        }
    }

    /// Straight segment between two 3D points.
    pub fn line(area: Area, extruder_id: u32, from: Point3, to: Point3, speed: f64, extrusion: f64) -> Self {
        Self {
            area,
            from,
            to,
            speed,
            extrusion,
            absolute_extrusion: 0.0,
            arc: None,
            extruder_id,
            lift: 0.0,
            command: None,
        }
    }

    /// Extruder-only motion from `from` to `to` (usually the same point).
    pub fn halt(area: Area, extruder_id: u32, from: Point3, to: Point3, speed: f64, amount: f64) -> Self {
        Self {
            absolute_extrusion: amount,
            ..Self::line(area, extruder_id, from, to, speed, 0.0)
        }
    }

    /// Non-motion machine command executed at `at`.
    pub fn command(label: impl Into<String>, extruder_id: u32, at: Point3) -> Self {
        Self {
            command: Some(label.into()),
            ..Self::line(Area::Command, extruder_id, at, at, 0.0, 0.0)
        }
    }

    /// Path length; arcs measure along the XY circle.
    pub fn length(&self) -> f64 {
        if self.is_command() {
            return 0.0;
        }
        match &self.arc {
            Some(arc) => (flatten(&self.from) - arc.center).norm() * arc.angle,
            None => (self.to - self.from).norm(),
        }
    }

    /// Seconds needed; zero-length halts take as long as their filament motion.
    pub fn time(&self) -> f64 {
        if self.speed <= 0.0 {
            return 0.0;
        }
        let len = self.length();
        if len > Tolerance::TOOLPATH.linear {
            len / self.speed
        } else {
            self.absolute_extrusion.abs() / self.speed
        }
    }

    /// Non-motion command?
    pub fn is_command(&self) -> bool {
        self.area == Area::Command
    }

    /// Does the segment carry retract/push filament?
    pub fn has_absolute_extrusion(&self) -> bool {
        self.absolute_extrusion.abs() > EXTRUSION_EPS
    }

    /// Pure travel: no filament moves at all.
    pub fn is_move(&self) -> bool {
        !self.is_command() && self.extrusion.abs() < EXTRUSION_EPS && !self.has_absolute_extrusion()
    }

    /// Extruding motion eligible to carry retract/push filament.
    pub fn is_plain_extrusion(&self) -> bool {
        !self.is_command() && !self.is_move() && !self.has_absolute_extrusion()
    }

    /// Relative plus absolute filament.
    pub fn total_extrusion(&self) -> f64 {
        self.extrusion + self.absolute_extrusion
    }

    /// Add retract/push filament.
    pub fn add_absolute_extrusion(&mut self, amount: f64) {
        self.absolute_extrusion += amount;
    }

    /// Filament that fits into this segment's duration at `ao_speed`.
    pub fn max_absolute_amount(&self, ao_speed: f64) -> f64 {
        self.time() * ao_speed
    }

    /// Start point including lift.
    pub fn lifted_from(&self) -> Point3 {
        self.from + Vec3::new(0.0, 0.0, self.lift)
    }

    /// End point including lift.
    pub fn lifted_to(&self) -> Point3 {
        self.to + Vec3::new(0.0, 0.0, self.lift)
    }

    /// Offset from start point to arc center (I/J words).
    pub fn arc_offset(&self) -> Option<Vec2> {
        self.arc.as_ref().map(|arc| arc.center - flatten(&self.from))
    }

    /// Point reached after traveling `at_length`.
    pub fn point_at(&self, at_length: f64) -> Point3 {
        let len = self.length();
        if len <= 0.0 {
            return self.from;
        }
        let t = (at_length / len).clamp(0.0, 1.0);
        match &self.arc {
            Some(arc) => {
                let p = arc.rotate(&flatten(&self.from), arc.angle * t);
                lift(&p, self.from.z + (self.to.z - self.from.z) * t)
            }
            None => Point3::from(self.from.coords.lerp(&self.to.coords, t)),
        }
    }

    /// Split after `at_length`; both extrusion kinds are shared by length.
    pub fn split_at(&self, at_length: f64) -> Option<(Segment3, Segment3)> {
        let len = self.length();
        let eps = Tolerance::TOOLPATH.linear;
        if self.is_command() || len <= 2.0 * eps || at_length <= eps || at_length >= len - eps {
            return None;
        }
        let t = at_length / len;
        let mid = self.point_at(at_length);
        let mut first = self.clone();
        let mut second = self.clone();
        first.to = mid;
        second.from = mid;
        first.extrusion = self.extrusion * t;
        second.extrusion = self.extrusion - first.extrusion;
        first.absolute_extrusion = self.absolute_extrusion * t;
        second.absolute_extrusion = self.absolute_extrusion - first.absolute_extrusion;
        if let Some(arc) = &self.arc {
            first.arc = Some(Arc {
                angle: arc.angle * t,
                ..*arc
            });
            second.arc = Some(Arc {
                angle: arc.angle * (1.0 - t),
                ..*arc
            });
        }
        Some((first, second))
    }

    /// Planar start point.
    pub fn from_2d(&self) -> Point2 {
        flatten(&self.from)
    }

    /// Planar end point.
    pub fn to_2d(&self) -> Point2 {
        flatten(&self.to)
    }
}

/// Lift a whole planar segment list to height `z`.
pub fn lift_segments(segments: &[Segment], z: f64, extrusion_per_mm: f64) -> Vec<Segment3> {
    segments
        .iter()
        .filter(|s| !s.is_noop())
        .map(|s| Segment3::from_segment(s, z, extrusion_per_mm))
        .collect()
}

/// Split segment `index` in place after `at_length`; returns how many were inserted.
pub fn divide_at(lines: &mut Vec<Segment3>, index: usize, at_length: f64) -> usize {
    let Some(line) = lines.get(index) else {
        return 0;
    };
    match line.split_at(at_length) {
        Some((first, second)) => {
            lines[index] = first;
            lines.insert(index + 1, second);
            1
        }
        None => 0,
    }
}

/// Summed length of `lines[from..=to]`.
pub fn range_length(lines: &[Segment3], from: usize, to: usize) -> f64 {
    if from > to || to >= lines.len() {
        return 0.0;
    }
    lines[from..=to].iter().map(Segment3::length).sum()
}

/// Summed time of `lines[from..=to]`.
pub fn range_time(lines: &[Segment3], from: usize, to: usize) -> f64 {
    if from > to || to >= lines.len() {
        return 0.0;
    }
    lines[from..=to].iter().map(Segment3::time).sum()
}

/// Total relative plus absolute filament.
pub fn total_extrusion(lines: &[Segment3]) -> f64 {
    lines.iter().map(Segment3::total_extrusion).sum()
}

/// Total relative filament.
pub fn total_relative_extrusion(lines: &[Segment3]) -> f64 {
    lines.iter().map(|l| l.extrusion).sum()
}

/// Total retract/push filament; zero when every retract was re-pushed.
pub fn total_absolute_extrusion(lines: &[Segment3]) -> f64 {
    lines.iter().map(|l| l.absolute_extrusion).sum()
}

/// Total time.
pub fn total_seconds(lines: &[Segment3]) -> f64 {
    lines.iter().map(Segment3::time).sum()
}
