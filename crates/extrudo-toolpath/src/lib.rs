#![warn(missing_docs)]

//! Toolpath planning for FDM printing.
//!
//! This crate turns the closed contours of one layer into an ordered list
//! of printing and travel moves, optimizes that list (arc fitting, corner
//! capping, line merging, travel clipping, cooling slowdown), lifts it to
//! the layer height and compensates oozing around long travels by spreading
//! retract and push filament over the neighboring lines.
//!
//! # Example
//!
//! ```ignore
//! use extrudo_toolpath::{process_layers, EngineSettings, LayerInput, NoProgress};
//! use extrudo_math::Point2;
//!
//! let layers: Vec<LayerInput> = // ... contours per layer
//! let settings = EngineSettings::default();
//! let (toolpaths, stats) = process_layers(&layers, Point2::origin(), &settings, &NoProgress)?;
//!
//! println!("Layers: {}", toolpaths.len());
//! println!("Print time: {:.0}s", stats.print_time_seconds);
//! ```

pub mod antiooze;
pub mod builder;
pub mod error;
pub mod layer;
pub mod optimize;
pub mod path;
pub mod progress;
pub mod segment;
pub mod segment3;
pub mod settings;

pub use antiooze::{apply_antiooze, find_move_range, AntioozeReport, MoveRange};
pub use builder::{build, BuiltPath};
pub use error::{EngineError, Result};
pub use layer::{process_layer, process_layers, LayerInput, LayerSpec, LayerStats, LayerToolpath, PrintStats};
pub use optimize::{optimize, OptimizeReport};
pub use path::{square, Polygon, PolygonSpec, PrintPolygon};
pub use progress::{CancelFlag, NoProgress, Progress};
pub use segment::{Arc, ArcDirection, Area, Segment};
pub use segment3::Segment3;
pub use settings::{
    AntioozeSettings, ArcSettings, BuilderSettings, CoolingSettings, CornerSettings, EngineSettings, SpeedSettings,
};

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use extrudo_math::{Point2, Point3, Tolerance};
    use std::f64::consts::TAU;

    fn shell(polygon: Polygon) -> PrintPolygon {
        PrintPolygon::new(polygon, Area::Shell, 40.0)
    }

    #[test]
    fn test_three_squares_in_x_order() {
        let polys = vec![
            shell(square(40.0, 0.0, 10.0)),
            shell(square(0.0, 0.0, 10.0)),
            shell(square(20.0, 0.0, 10.0)),
        ];
        let built = build(&polys, Point2::origin(), &BuilderSettings::default(), 150.0, &NoProgress).unwrap();
        assert_eq!(built.order, vec![1, 2, 0]);
        let travels: Vec<_> = built.segments.iter().filter(|s| s.is_move()).collect();
        assert_eq!(travels.len(), 2);
        assert_abs_diff_eq!(travels[0].length(), 20.0);
        assert_abs_diff_eq!(travels[1].length(), 20.0);
        let printing: Vec<_> = built.segments.iter().filter(|s| !s.is_move()).collect();
        assert_eq!(printing.len(), 12);
        for (k, contour) in printing.chunks(4).enumerate() {
            let x0 = 20.0 * k as f64;
            assert!(contour.iter().all(|s| s.from.x >= x0 && s.from.x <= x0 + 10.0));
        }
    }

    #[test]
    fn test_retract_split_on_nearest_segment() {
        // Four 6 mm lines at 20 mm/s (1.2 s) followed by an 8 mm travel.
        let mut lines: Vec<Segment3> = (0..4)
            .map(|k| {
                let x = k as f64 * 6.0;
                Segment3::line(Area::Shell, 0, Point3::new(x, 0.0, 0.2), Point3::new(x + 6.0, 0.0, 0.2), 20.0, 0.25)
            })
            .collect();
        lines.push(Segment3::line(
            Area::Shell,
            0,
            Point3::new(24.0, 0.0, 0.2),
            Point3::new(32.0, 0.0, 0.2),
            150.0,
            0.0,
        ));
        let settings = AntioozeSettings {
            enabled: true,
            min_distance: 5.0,
            amount: 2.0,
            speed: 30.0,
            ..Default::default()
        };
        let report = apply_antiooze(&mut lines, &settings, &NoProgress).unwrap();

        assert_eq!(report.splits, 1);
        // nothing to push into after the travel
        assert_eq!(report.halts, 1);
        assert_eq!(lines.len(), 7);
        assert!(lines[..4].iter().all(|l| l.absolute_extrusion == 0.0));
        assert_abs_diff_eq!(lines[4].absolute_extrusion, -2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lines[4].to.x, 24.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lines[4].time(), 2.0 / 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(lines[3].length() + lines[4].length(), 6.0, epsilon = 1e-9);
        assert!(lines[5].is_move());
        assert_abs_diff_eq!(lines[6].absolute_extrusion, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_retract_halt_when_move_is_first() {
        let mut lines = vec![
            Segment3::line(Area::Shell, 0, Point3::new(0.0, 0.0, 0.2), Point3::new(10.0, 0.0, 0.2), 150.0, 0.0),
            Segment3::line(Area::Shell, 0, Point3::new(10.0, 0.0, 0.2), Point3::new(20.0, 0.0, 0.2), 20.0, 0.4),
        ];
        let settings = AntioozeSettings {
            enabled: true,
            min_distance: 5.0,
            amount: 1.5,
            speed: 30.0,
            ..Default::default()
        };
        let report = apply_antiooze(&mut lines, &settings, &NoProgress).unwrap();

        assert_eq!(report.halts, 1);
        assert_eq!(lines[0].length(), 0.0);
        assert_abs_diff_eq!(lines[0].absolute_extrusion, -1.5);
        assert_eq!(lines[0].from, Point3::new(0.0, 0.0, 0.2));
        assert!(lines[1].is_move());
    }

    #[test]
    fn test_coverage() {
        let polys = vec![
            shell(square(0.0, 0.0, 10.0)),
            shell(Polygon::new(vec![
                Point2::new(30.0, 30.0),
                Point2::new(35.0, 31.0),
                Point2::new(33.0, 36.0),
            ])),
            shell(square(-20.0, 5.0, 3.0)),
        ];
        let built = build(&polys, Point2::new(50.0, 50.0), &BuilderSettings::default(), 150.0, &NoProgress).unwrap();
        let tol = Tolerance::TOOLPATH;
        for poly in &polys {
            for v in &poly.polygon.points {
                assert!(
                    built
                        .segments
                        .iter()
                        .any(|s| tol.points_equal_2d(&s.from, v) || tol.points_equal_2d(&s.to, v)),
                    "vertex {v:?} not covered"
                );
            }
        }
        let mut order = built.order.clone();
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_single_vertex_polygon() {
        let polys = vec![shell(Polygon::new(vec![Point2::new(3.0, 3.0)]))];
        let built = build(&polys, Point2::origin(), &BuilderSettings::default(), 150.0, &NoProgress).unwrap();
        assert!(built.segments.is_empty());
        assert!(built.order.is_empty());
    }

    #[test]
    fn test_circle_layer_becomes_one_arc() {
        let points: Vec<Point2> = (0..72)
            .map(|k| {
                let a = TAU * k as f64 / 72.0;
                Point2::new(50.0 + 8.0 * a.cos(), 50.0 + 8.0 * a.sin())
            })
            .collect();
        let input = LayerInput {
            index: 0,
            z: 0.2,
            polygons: vec![shell(Polygon::new(points))],
            commands: Vec::new(),
        };
        let mut settings = EngineSettings::default();
        settings.arcs.enabled = true;
        let layer = process_layer(&input, Point2::new(58.0, 50.0), &settings, &NoProgress).unwrap();

        assert_eq!(layer.stats.optimize.arcs, 1);
        assert_eq!(layer.segments.len(), 1);
        let arc = layer.segments[0].arc.unwrap();
        assert_eq!(arc.direction, ArcDirection::CounterClockWise);
        assert_abs_diff_eq!(arc.angle, TAU, epsilon = 1e-6);
        assert_abs_diff_eq!(layer.segments[0].length(), TAU * 8.0, epsilon = 1e-6);
    }

    #[test]
    fn test_full_pipeline_conserves_filament() {
        let input = LayerInput {
            index: 3,
            z: 0.6,
            polygons: vec![
                shell(square(0.0, 0.0, 10.0)),
                shell(square(30.0, 0.0, 10.0)),
                shell(square(60.0, 0.0, 10.0)),
            ],
            commands: Vec::new(),
        };
        let mut settings = EngineSettings::default();
        settings.antiooze.enabled = true;
        settings.antiooze.z_lift = 0.3;
        settings.corners.enabled = true;
        settings.cooling.min_layer_time = 10.0;
        let layer = process_layer(&input, Point2::origin(), &settings, &NoProgress).unwrap();

        assert_eq!(layer.stats.antiooze.ranges, 2);
        assert!(layer.stats.optimize.corners_capped > 0);
        assert!(layer.stats.optimize.slowdown_factor < 1.0);
        let absolute: f64 = layer.segments.iter().map(|s| s.absolute_extrusion).sum();
        assert_abs_diff_eq!(absolute, 0.0, epsilon = 1e-9);
        assert!(layer.segments.iter().filter(|s| s.is_move()).all(|s| s.lift == 0.3));
    }
}
