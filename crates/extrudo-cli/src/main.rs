//! extrudo CLI - toolpath planning from the command line
//!
//! Reads layer contours as JSON, runs the toolpath engine and writes the
//! resulting machine directives.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use extrudo_gcode::{Directive, Emitter, MachineProfile, PROFILE_KEYS};
use extrudo_math::Point2;
use extrudo_toolpath::{process_layers, LayerInput, LayerSpec, PrintStats};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, trace, warn};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "extrudo")]
#[command(about = "FDM toolpath planner with anti-ooze compensation", long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a layers JSON file into machine directives
    Run {
        /// Layers file: a JSON array of {z, polygons, commands}
        layers: PathBuf,
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output JSON file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Built-in machine profile, overriding the config file
        #[arg(short, long)]
        profile: Option<String>,
        /// Start position X (mm)
        #[arg(long, default_value_t = 0.0)]
        start_x: f64,
        /// Start position Y (mm)
        #[arg(long, default_value_t = 0.0)]
        start_y: f64,
    },
    /// Print the default configuration as TOML
    Defaults,
    /// List built-in machine profiles
    Profiles,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    stats: &'a PrintStats,
    directives: &'a [Directive],
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            layers,
            config,
            output,
            profile,
            start_x,
            start_y,
        } => {
            let config = match &config {
                Some(path) => Config::load(path)?,
                None => Config::default(),
            };
            run(
                &layers,
                &config,
                profile.as_deref(),
                Point2::new(start_x, start_y),
                output.as_deref(),
            )?;
        }
        Commands::Defaults => {
            print!("{}", Config::default_toml()?);
        }
        Commands::Profiles => {
            for (key, profile) in PROFILE_KEYS.iter().zip(MachineProfile::all_profiles()) {
                println!(
                    "{:<10} {:<20} {:>4.0}x{:<4.0}x{:>4.0} mm  xy {:>4.0} mm/s  z {:>3.0} mm/s",
                    key, profile.name, profile.bed_x, profile.bed_y, profile.bed_z, profile.max_feedrate_xy, profile.max_feedrate_z
                );
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(layers: &Path, config: &Config, profile: Option<&str>, start: Point2, output: Option<&Path>) -> Result<()> {
    let machine = config.machine(profile)?;
    let engine = config.engine_for(&machine);
    engine.validate().context("invalid engine settings")?;
    let limits = machine.emitter_settings(&engine.speeds);
    limits.validate()?;

    let text = std::fs::read_to_string(layers).with_context(|| format!("reading {}", layers.display()))?;
    let specs: Vec<LayerSpec> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", layers.display()))?;
    let inputs: Vec<LayerInput> = specs.iter().enumerate().map(|(i, spec)| spec.to_input(i)).collect();
    check_bounds(&inputs, &machine);

    let progress = |stage: &'static str, done: usize, total: usize| {
        trace!(stage, done, total, "progress");
        true
    };
    let (toolpaths, stats) = process_layers(&inputs, start, &engine, &progress)?;

    let mut emitter = Emitter::new(&limits);
    for toolpath in &toolpaths {
        emitter.emit_layer(&toolpath.segments);
    }
    let directives = emitter.finish();

    let json = serde_json::to_string_pretty(&RunOutput {
        stats: &stats,
        directives: &directives,
    })?;
    match output {
        Some(path) => std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }

    info!(
        machine = %machine.name,
        layers = stats.layer_count,
        directives = directives.len(),
        seconds = stats.print_time_seconds,
        filament_mm = stats.filament_mm,
        retracts = stats.retract_cycles,
        "done"
    );
    Ok(())
}

fn check_bounds(inputs: &[LayerInput], machine: &MachineProfile) {
    for input in inputs {
        let outside = input
            .polygons
            .iter()
            .flat_map(|p| p.polygon.points.iter())
            .filter(|v| !machine.in_bounds(v.x, v.y, input.z))
            .count();
        if outside > 0 {
            warn!(layer = input.index, outside, machine = %machine.name, "vertices outside the build volume");
        }
    }
}
