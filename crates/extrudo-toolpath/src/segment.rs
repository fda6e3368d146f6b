//! Planar motion primitives: straight lines and circular arcs.

use std::f64::consts::TAU;

use extrudo_math::{direction_angle, lerp, turn_angle, Point2, Tolerance, Vec2};
use serde::{Deserialize, Serialize};

/// Extrusion amounts below this are treated as zero.
pub const EXTRUSION_EPS: f64 = 1e-5;

/// Feature type a segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    /// Unclassified (travel between features).
    #[default]
    Undefined,
    /// Perimeter walls.
    Shell,
    /// Solid top/bottom skin.
    Skin,
    /// Sparse infill.
    Infill,
    /// Support structures.
    Support,
    /// Skirt around the print.
    Skirt,
    /// Bridging extrusion.
    Bridge,
    /// Non-motion machine command.
    Command,
}

impl Area {
    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Area::Undefined => "",
            Area::Shell => "Shell",
            Area::Skin => "Skin",
            Area::Infill => "Infill",
            Area::Support => "Support",
            Area::Skirt => "Skirt",
            Area::Bridge => "Bridge",
            Area::Command => "Command",
        }
    }
}

/// Rotation sense of an arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcDirection {
    /// Clockwise (G2).
    ClockWise,
    /// Counter-clockwise (G3).
    CounterClockWise,
}

impl ArcDirection {
    /// Direction of a turn with the given sign (positive is left).
    pub fn from_turn(turn: f64) -> Self {
        if turn >= 0.0 {
            ArcDirection::CounterClockWise
        } else {
            ArcDirection::ClockWise
        }
    }

    /// +1 for counter-clockwise, -1 for clockwise.
    pub fn sign(&self) -> f64 {
        match self {
            ArcDirection::ClockWise => -1.0,
            ArcDirection::CounterClockWise => 1.0,
        }
    }
}

/// Arc geometry attached to a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    /// Rotation sense.
    pub direction: ArcDirection,
    /// Circle center.
    pub center: Point2,
    /// Swept angle in `(0, 2π]`.
    pub angle: f64,
}

impl Arc {
    /// Arc from `from` to `to` around `center`; equal endpoints give a full circle.
    pub fn through(from: &Point2, to: &Point2, center: Point2, direction: ArcDirection) -> Self {
        Self {
            direction,
            center,
            angle: swept_angle(from, to, &center, direction),
        }
    }

    /// Radius measured from a point on the arc.
    pub fn radius_from(&self, p: &Point2) -> f64 {
        (p - self.center).norm()
    }

    /// Tangent (unit) direction of travel at point `p` on the circle.
    pub fn tangent_at(&self, p: &Point2) -> Vec2 {
        let r = p - self.center;
        let t = Vec2::new(-r.y, r.x) * self.direction.sign();
        let n = t.norm();
        if n > 0.0 {
            t / n
        } else {
            t
        }
    }

    /// Rotate `p` about the center by `angle` in the arc's direction.
    pub fn rotate(&self, p: &Point2, angle: f64) -> Point2 {
        let (s, c) = (angle * self.direction.sign()).sin_cos();
        let r = p - self.center;
        self.center + Vec2::new(r.x * c - r.y * s, r.x * s + r.y * c)
    }
}

/// Angle swept from `from` to `to` around `center` in `direction`, in `(0, 2π]`.
pub fn swept_angle(from: &Point2, to: &Point2, center: &Point2, direction: ArcDirection) -> f64 {
    let a0 = direction_angle(&(from - center));
    let a1 = direction_angle(&(to - center));
    let mut a = match direction {
        ArcDirection::CounterClockWise => a1 - a0,
        ArcDirection::ClockWise => a0 - a1,
    };
    while a < 0.0 {
        a += TAU;
    }
    if a <= Tolerance::TOOLPATH.angular {
        a = TAU;
    }
    a.min(TAU)
}

/// One planar motion primitive with speed and extrusion metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Feature type.
    pub area: Area,
    /// Start point.
    pub from: Point2,
    /// End point.
    pub to: Point2,
    /// Feed rate (mm/s).
    pub speed: f64,
    /// Relative extrusion feed; 0 means pure travel.
    pub feed_ratio: f64,
    /// Extra filament applied regardless of length (mm of filament).
    pub absolute_extrusion: f64,
    /// Arc geometry, `None` for straight lines.
    pub arc: Option<Arc>,
    /// Extruder index.
    pub extruder_id: u32,
    /// Z offset applied while traveling.
    pub lift: f64,
}

impl Segment {
    /// Straight extruding (or travel, with `feed_ratio == 0`) line.
    pub fn line(
        area: Area,
        extruder_id: u32,
        from: Point2,
        to: Point2,
        speed: f64,
        feed_ratio: f64,
    ) -> Self {
        Self {
            area,
            from,
            to,
            speed,
            feed_ratio,
            absolute_extrusion: 0.0,
            arc: None,
            extruder_id,
            lift: 0.0,
        }
    }

    /// Non-extruding travel.
    pub fn travel(area: Area, extruder_id: u32, from: Point2, to: Point2, speed: f64) -> Self {
        Self::line(area, extruder_id, from, to, speed, 0.0)
    }

    /// Circular arc from `from` to `to` around `center`.
    #[allow(clippy::too_many_arguments)]
    pub fn arc(
        area: Area,
        extruder_id: u32,
        from: Point2,
        to: Point2,
        speed: f64,
        feed_ratio: f64,
        center: Point2,
        direction: ArcDirection,
    ) -> Self {
        Self {
            arc: Some(Arc::through(&from, &to, center, direction)),
            ..Self::line(area, extruder_id, from, to, speed, feed_ratio)
        }
    }

    /// Chord vector.
    pub fn dir(&self) -> Vec2 {
        self.to - self.from
    }

    /// Path length (arc length for arcs).
    pub fn length(&self) -> f64 {
        if self.area == Area::Command {
            return 0.0;
        }
        match &self.arc {
            Some(arc) => arc.radius_from(&self.from) * arc.angle,
            None => (self.to - self.from).norm(),
        }
    }

    /// Seconds needed at the segment's speed.
    pub fn time(&self) -> f64 {
        if self.speed > 0.0 {
            self.length() / self.speed
        } else {
            0.0
        }
    }

    /// Pure travel (no extrusion feed)?
    pub fn is_move(&self) -> bool {
        self.feed_ratio.abs() < EXTRUSION_EPS
    }

    /// Non-motion command?
    pub fn is_command(&self) -> bool {
        self.area == Area::Command
    }

    /// Does the segment carry extra absolute extrusion?
    pub fn has_absolute_extrusion(&self) -> bool {
        self.absolute_extrusion.abs() > EXTRUSION_EPS
    }

    /// Zero-length line without any extrusion: does nothing when emitted.
    pub fn is_noop(&self) -> bool {
        self.arc.is_none()
            && !self.is_command()
            && !self.has_absolute_extrusion()
            && Tolerance::TOOLPATH.points_equal_2d(&self.from, &self.to)
    }

    /// Direction of travel at the start.
    pub fn start_tangent(&self) -> Vec2 {
        match &self.arc {
            Some(arc) => arc.tangent_at(&self.from),
            None => self.dir(),
        }
    }

    /// Direction of travel at the end.
    pub fn end_tangent(&self) -> Vec2 {
        match &self.arc {
            Some(arc) => arc.tangent_at(&self.to),
            None => self.dir(),
        }
    }

    /// Signed turn from the end of this segment into `next`.
    pub fn angle_to(&self, next: &Segment) -> f64 {
        turn_angle(&self.end_tangent(), &next.start_tangent())
    }

    /// Maximum distance between an arc and its chord (sagitta); 0 for lines.
    pub fn distance_from_chord(&self) -> f64 {
        match &self.arc {
            Some(arc) => {
                let r = arc.radius_from(&self.from);
                r * (1.0 - (arc.angle / 2.0).cos())
            }
            None => 0.0,
        }
    }

    /// Point reached after traveling `at_length` along the segment.
    pub fn point_at(&self, at_length: f64) -> Point2 {
        let len = self.length();
        if len <= 0.0 {
            return self.from;
        }
        let t = (at_length / len).clamp(0.0, 1.0);
        match &self.arc {
            Some(arc) => arc.rotate(&self.from, arc.angle * t),
            None => lerp(&self.from, &self.to, t),
        }
    }

    /// Split into two segments after `at_length`.
    ///
    /// Returns `None` when the split point would coincide with an endpoint.
    /// Absolute extrusion is shared proportionally to length.
    pub fn split_at(&self, at_length: f64) -> Option<(Segment, Segment)> {
        let len = self.length();
        let eps = Tolerance::TOOLPATH.linear;
        if len <= 2.0 * eps || at_length <= eps || at_length >= len - eps {
            return None;
        }
        let t = at_length / len;
        let mid = self.point_at(at_length);
        let mut first = self.clone();
        let mut second = self.clone();
        first.to = mid;
        second.from = mid;
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

    /// Divide a straight segment at the given points, in order.
    ///
    /// Points that do not advance along the segment are ignored; arcs are
    /// returned unchanged.
    pub fn divide(&self, points: &[Point2]) -> Vec<Segment> {
        if self.arc.is_some() || points.is_empty() {
            return vec![self.clone()];
        }
        let len = self.length();
        let mut pieces = Vec::with_capacity(points.len() + 1);
        let mut start = self.from;
        let mut covered = 0.0;
        for p in points {
            let along = (p - self.from).dot(&self.dir()) / len.max(f64::MIN_POSITIVE);
            if along <= covered + Tolerance::TOOLPATH.linear || along >= len - Tolerance::TOOLPATH.linear {
                continue;
            }
            let mut piece = self.clone();
            piece.from = start;
            piece.to = *p;
            pieces.push(piece);
            start = *p;
            covered = along;
        }
        let mut last = self.clone();
        last.from = start;
        pieces.push(last);
        if pieces.len() > 1 {
            let total: f64 = pieces.iter().map(Segment::length).sum();
            for piece in &mut pieces {
                piece.absolute_extrusion = self.absolute_extrusion * piece.length() / total;
            }
        }
        pieces
    }
}

/// Sum of lengths.
pub fn total_length(segments: &[Segment]) -> f64 {
    segments.iter().map(Segment::length).sum()
}

/// Sum of times.
pub fn total_seconds(segments: &[Segment]) -> f64 {
    segments.iter().map(Segment::time).sum()
}

/// Sum of times of extruding segments.
pub fn total_seconds_extruding(segments: &[Segment]) -> f64 {
    segments.iter().filter(|s| !s.is_move()).map(Segment::time).sum()
}
