//! Convert final segments into machine directives.

use extrudo_math::{flatten, Point3, Tolerance};
use extrudo_toolpath::Segment3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::directive::Directive;
use crate::error::{EmitError, Result};

/// Machine speed limits applied while emitting (mm/s).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterSettings {
    /// Slowest extruding speed.
    pub min_speed: f64,
    /// Fastest extruding speed.
    pub max_speed: f64,
    /// Travel speed.
    pub move_speed: f64,
    /// Fastest filament feed.
    pub max_filament_speed: f64,
    /// Fastest Z motion.
    pub max_z_speed: f64,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            min_speed: 10.0,
            max_speed: 80.0,
            move_speed: 150.0,
            max_filament_speed: 40.0,
            max_z_speed: 10.0,
        }
    }
}

impl EmitterSettings {
    /// Validate limits.
    pub fn validate(&self) -> Result<()> {
        let all = [
            self.min_speed,
            self.max_speed,
            self.move_speed,
            self.max_filament_speed,
            self.max_z_speed,
        ];
        if all.iter().any(|s| s.is_nan() || *s <= 0.0) {
            return Err(EmitError::InvalidLimits("all speeds must be positive".into()));
        }
        if self.max_speed < self.min_speed {
            return Err(EmitError::InvalidLimits("max_speed is below min_speed".into()));
        }
        Ok(())
    }
}

/// Stateful emitter tracking the tool position across layers.
#[derive(Debug)]
pub struct Emitter<'a> {
    settings: &'a EmitterSettings,
    position: Option<Point3>,
    directives: Vec<Directive>,
}

impl<'a> Emitter<'a> {
    /// Emitter with an unknown starting position.
    pub fn new(settings: &'a EmitterSettings) -> Self {
        Self {
            settings,
            position: None,
            directives: Vec::new(),
        }
    }

    /// Emitter starting at a known position.
    pub fn with_position(settings: &'a EmitterSettings, position: Point3) -> Self {
        Self {
            position: Some(position),
            ..Self::new(settings)
        }
    }

    /// Current tool position.
    pub fn position(&self) -> Option<Point3> {
        self.position
    }

    /// Directives emitted so far.
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Finish and hand out the directives.
    pub fn finish(self) -> Vec<Directive> {
        self.directives
    }

    /// Emit all segments of one layer.
    pub fn emit_layer(&mut self, lines: &[Segment3]) {
        let before = self.directives.len();
        for line in lines {
            self.emit_segment(line);
        }
        debug!(
            segments = lines.len(),
            directives = self.directives.len() - before,
            "emitted layer"
        );
    }

    /// Emit one segment: an optional positioning move, then the segment itself.
    pub fn emit_segment(&mut self, line: &Segment3) {
        if line.is_command() {
            self.directives.push(Directive::Command {
                label: line.command.clone().unwrap_or_default(),
            });
            return;
        }

        let tol = Tolerance::TOOLPATH;
        let start = line.lifted_from();
        if self.position.map_or(true, |p| !tol.points_equal(&p, &start)) {
            self.travel_to(start);
        }

        let end = line.lifted_to();
        if line.is_move() {
            if !tol.points_equal(&start, &end) {
                self.travel_to(end);
            }
            return;
        }

        let extrusion = line.total_extrusion();
        let speed = self.print_speed(line, extrusion);
        let directive = match (&line.arc, line.arc_offset()) {
            (Some(arc), Some(center_offset)) => Directive::Arc {
                direction: arc.direction,
                center_offset,
                target: end,
                speed,
                extrusion,
            },
            _ => Directive::Line {
                target: end,
                speed,
                extrusion,
            },
        };
        self.directives.push(directive);
        self.position = Some(end);
    }

    fn travel_to(&mut self, target: Point3) {
        let speed = match self.position {
            Some(from) if Tolerance::TOOLPATH.points_equal_2d(&flatten(&from), &flatten(&target)) => {
                self.settings.move_speed.min(self.settings.max_z_speed)
            }
            _ => self.settings.move_speed,
        };
        self.directives.push(Directive::Move { target, speed });
        self.position = Some(target);
    }

    /// Feed rate for an extruding segment after machine limits.
    fn print_speed(&self, line: &Segment3, extrusion: f64) -> f64 {
        let s = self.settings;
        let eps = Tolerance::TOOLPATH.linear;
        let length = line.length();
        let xy_length = match &line.arc {
            Some(_) => length,
            None => (line.to_2d() - line.from_2d()).norm(),
        };

        let mut speed = if xy_length > eps {
            line.speed.clamp(s.min_speed, s.max_speed)
        } else if length > eps {
            line.speed.min(s.max_z_speed)
        } else {
            return line.speed.min(s.max_filament_speed);
        };

        let feed = extrusion.abs() * speed / length;
        if feed > s.max_filament_speed {
            speed *= s.max_filament_speed / feed;
        }
        speed
    }
}

/// Emit a single layer from an unknown position.
pub fn emit(lines: &[Segment3], settings: &EmitterSettings) -> Vec<Directive> {
    let mut emitter = Emitter::new(settings);
    emitter.emit_layer(lines);
    emitter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use extrudo_math::Point2;
    use extrudo_toolpath::{Area, ArcDirection, Segment};

    fn line(from: (f64, f64), to: (f64, f64), speed: f64, extrusion: f64) -> Segment3 {
        Segment3::line(
            Area::Shell,
            0,
            Point3::new(from.0, from.1, 0.2),
            Point3::new(to.0, to.1, 0.2),
            speed,
            extrusion,
        )
    }

    #[test]
    fn test_positioning_move_first() {
        let out = emit(&[line((5.0, 5.0), (15.0, 5.0), 40.0, 0.4)], &EmitterSettings::default());
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0],
            Directive::Move {
                target: Point3::new(5.0, 5.0, 0.2),
                speed: 150.0
            }
        );
        assert!(matches!(out[1], Directive::Line { speed, .. } if speed == 40.0));
    }

    #[test]
    fn test_connected_lines_one_directive_each() {
        let lines = vec![
            line((0.0, 0.0), (10.0, 0.0), 40.0, 0.4),
            line((10.0, 0.0), (10.0, 10.0), 40.0, 0.4),
        ];
        let settings = EmitterSettings::default();
        let mut emitter = Emitter::with_position(&settings, Point3::new(0.0, 0.0, 0.2));
        emitter.emit_layer(&lines);
        assert_eq!(emitter.directives().len(), 2);
        assert_eq!(emitter.position(), Some(Point3::new(10.0, 10.0, 0.2)));
    }

    #[test]
    fn test_speed_clamped() {
        let settings = EmitterSettings::default();
        let out = emit(&[line((0.0, 0.0), (10.0, 0.0), 500.0, 0.1)], &settings);
        assert_eq!(out[1].speed(), Some(80.0));
        let out = emit(&[line((0.0, 0.0), (10.0, 0.0), 1.0, 0.1)], &settings);
        assert_eq!(out[1].speed(), Some(10.0));
    }

    #[test]
    fn test_filament_speed_cap() {
        // 5 mm of filament over 1 mm at 40 mm/s would feed 200 mm/s.
        let out = emit(&[line((0.0, 0.0), (1.0, 0.0), 40.0, 5.0)], &EmitterSettings::default());
        assert_abs_diff_eq!(out[1].speed().unwrap(), 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_halt_speed_capped() {
        let p = Point3::new(0.0, 0.0, 0.2);
        let halt = Segment3::halt(Area::Shell, 0, p, p, 100.0, -2.0);
        let settings = EmitterSettings::default();
        let mut emitter = Emitter::with_position(&settings, p);
        emitter.emit_segment(&halt);
        let out = emitter.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].speed(), Some(40.0));
        assert_eq!(out[0].extrusion(), -2.0);
    }

    #[test]
    fn test_lifted_travel() {
        let mut travel = line((0.0, 0.0), (20.0, 0.0), 150.0, 0.0);
        travel.lift = 0.4;
        let settings = EmitterSettings::default();
        let mut emitter = Emitter::with_position(&settings, Point3::new(0.0, 0.0, 0.2));
        emitter.emit_segment(&travel);
        let out = emitter.finish();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].speed(), Some(10.0));
        assert_abs_diff_eq!(out[0].target().unwrap().z, 0.6, epsilon = 1e-12);
        assert_eq!(out[1].speed(), Some(150.0));
    }

    #[test]
    fn test_arc_offset() {
        let seg = Segment::arc(
            Area::Shell,
            0,
            Point2::new(10.0, 0.0),
            Point2::new(0.0, 10.0),
            30.0,
            1.0,
            Point2::origin(),
            ArcDirection::CounterClockWise,
        );
        let arc = Segment3::from_segment(&seg, 0.2, 0.04);
        let settings = EmitterSettings::default();
        let mut emitter = Emitter::with_position(&settings, Point3::new(10.0, 0.0, 0.2));
        emitter.emit_segment(&arc);
        match &emitter.directives()[0] {
            Directive::Arc {
                direction,
                center_offset,
                extrusion,
                ..
            } => {
                assert_eq!(*direction, ArcDirection::CounterClockWise);
                assert_abs_diff_eq!(center_offset.x, -10.0);
                assert_abs_diff_eq!(center_offset.y, 0.0);
                assert_abs_diff_eq!(*extrusion, 5.0 * std::f64::consts::PI * 0.04, epsilon = 1e-12);
            }
            other => panic!("expected an arc, got {other:?}"),
        }
    }

    #[test]
    fn test_command() {
        let cmd = Segment3::command("M106 S128", 0, Point3::origin());
        let out = emit(&[cmd], &EmitterSettings::default());
        assert_eq!(out, vec![Directive::Command { label: "M106 S128".into() }]);
    }

    #[test]
    fn test_invalid_limits() {
        let settings = EmitterSettings {
            max_z_speed: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
        assert!(EmitterSettings::default().validate().is_ok());
    }
}
