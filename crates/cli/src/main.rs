#![deny(unsafe_code)]
//! CLI binary for the flow-field particle simulation.
//!
//! Subcommands:
//! - `run` runs a headless simulation and prints a summary
//! - `field` prints a generated grid as arrows
//! - `list` prints algorithms, brush modes and parameters

mod error;

use clap::{Parser, Subcommand};
use error::CliError;
use flowfield_core::{Brush, BrushMode, DVec2, Engine, FieldAlgorithm, GridConfig, Seed, Xorshift64};
use flowfield_particles::{ConstantAudio, ParticleSimulation, SimParams};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowfield", about = "Flow-field particle simulation CLI")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a headless simulation and print a summary.
    Run {
        /// Load the whole run description from a seed JSON file. Grid,
        /// population, params, seed, ticks and dt flags are then ignored.
        #[arg(long)]
        seed_file: Option<PathBuf>,

        /// Number of particles.
        #[arg(short = 'n', long, default_value_t = 2000)]
        population: usize,

        /// Grid cells per side.
        #[arg(short, long, default_value_t = 64)]
        resolution: usize,

        /// World width.
        #[arg(short = 'W', long, default_value_t = 64.0)]
        width: f64,

        /// World height.
        #[arg(short = 'H', long, default_value_t = 64.0)]
        height: f64,

        /// Field algorithm (angle-noise, curl-noise).
        #[arg(short, long, default_value = "angle-noise")]
        algorithm: String,

        /// Noise units per grid cell.
        #[arg(long, default_value_t = flowfield_core::grid::DEFAULT_NOISE_SCALE)]
        noise_scale: f64,

        /// Number of ticks to simulate.
        #[arg(short, long, default_value_t = 600)]
        ticks: usize,

        /// Seconds per tick.
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f64,

        /// PRNG seed for deterministic output.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Simulation parameters as a JSON string.
        #[arg(long, default_value = "{}")]
        params: String,

        /// Constant audio level in [0, 1] fed to the simulation every tick.
        #[arg(long)]
        audio: Option<f64>,

        /// Brush mode for a stroke painted before the run
        /// (directional, swirl, attract, repel).
        #[arg(long, requires = "stroke")]
        brush: Option<String>,

        /// Stroke segment in world units: "x0,y0,x1,y1".
        #[arg(long, requires = "brush")]
        stroke: Option<String>,

        /// Brush radius in world units.
        #[arg(long, default_value_t = 3.0)]
        brush_radius: f64,

        /// Brush strength in [0, 1].
        #[arg(long, default_value_t = 0.5)]
        brush_strength: f64,
    },
    /// Generate a grid and print it as arrows, top row first.
    Field {
        /// Grid cells per side.
        #[arg(short, long, default_value_t = 16)]
        resolution: usize,

        /// Field algorithm (angle-noise, curl-noise).
        #[arg(short, long, default_value = "angle-noise")]
        algorithm: String,

        /// Noise units per grid cell.
        #[arg(long, default_value_t = flowfield_core::grid::DEFAULT_NOISE_SCALE)]
        noise_scale: f64,

        /// PRNG seed for deterministic output.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// List field algorithms, brush modes and simulation parameters.
    List,
}

/// Upper bound on brush dabs painted for one stroke.
const MAX_DABS: usize = 4096;

/// Brush stroke painted once before a run.
struct Stroke {
    brush: Brush,
    from: DVec2,
    to: DVec2,
}

fn parse_params(raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|e| CliError::Input(format!("invalid --params JSON: {e}")))
}

fn parse_stroke(raw: &str) -> Result<(DVec2, DVec2), CliError> {
    let values = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CliError::Input(format!("invalid --stroke: {e}")))?;
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(CliError::Input(format!(
            "invalid --stroke: coordinate {bad} is not finite"
        )));
    }
    match values[..] {
        [x0, y0, x1, y1] => Ok((DVec2::new(x0, y0), DVec2::new(x1, y1))),
        _ => Err(CliError::Input(format!(
            "invalid --stroke: expected 4 numbers, got {}",
            values.len()
        ))),
    }
}

/// Validates the brush flags and parses the stroke segment.
fn build_stroke(mode: &str, segment: &str, radius: f64, strength: f64) -> Result<Stroke, CliError> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(CliError::Input(format!(
            "invalid --brush-radius {radius}: must be positive and finite"
        )));
    }
    if !strength.is_finite() {
        return Err(CliError::Input(format!(
            "invalid --brush-strength {strength}: must be finite"
        )));
    }
    let (from, to) = parse_stroke(segment)?;
    Ok(Stroke {
        brush: Brush::new(mode.parse()?, radius, strength),
        from,
        to,
    })
}

/// Run description built from flags. Grid keys in the params JSON
/// (`resolution`, `width`, `height`, `noise_scale`, `algorithm`) override
/// the matching flags.
fn seed_from_flags(
    grid: GridConfig,
    population: usize,
    params: &str,
    seed: u64,
    ticks: usize,
    dt: f64,
) -> Result<Seed, CliError> {
    let params = parse_params(params)?;
    Ok(Seed {
        grid: grid.merged(&params),
        population,
        params,
        seed,
        ticks,
        dt,
    })
}

fn load_seed(path: &Path) -> Result<Seed, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::Input(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| CliError::Input(format!("invalid seed file {}: {e}", path.display())))
}

/// Drags the brush along the stroke in steps of half a radius, so
/// consecutive dabs overlap. Never paints more than [`MAX_DABS`] dabs.
fn paint_stroke(sim: &mut ParticleSimulation, stroke: &Stroke) {
    let drag = stroke.to - stroke.from;
    let spacing = stroke.brush.radius * 0.5;
    let wanted = (drag.length() / spacing).ceil();
    let dabs = if wanted.is_nan() {
        1
    } else {
        wanted.clamp(1.0, MAX_DABS as f64) as usize
    };
    for i in 0..=dabs {
        let cursor = stroke.from.lerp(stroke.to, i as f64 / dabs as f64);
        sim.apply_brush(&stroke.brush, cursor, drag);
    }
}

/// Maps a direction onto one of eight ASCII arrows.
fn arrow(direction: DVec2) -> char {
    const ARROWS: [char; 8] = ['>', '/', '^', '\\', '<', '/', 'v', '\\'];
    let octant = (direction.y.atan2(direction.x) / std::f64::consts::FRAC_PI_4).round() as i64;
    ARROWS[octant.rem_euclid(8) as usize]
}

fn mean_speed(sim: &ParticleSimulation) -> f64 {
    let total: f64 = sim.particles().iter().map(|p| p.velocity().length()).sum();
    total / sim.population() as f64
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::List => {
            let algorithms = FieldAlgorithm::list_names();
            let brushes = BrushMode::list_names();
            let schema = SimParams::schema();
            if cli.json {
                let info = serde_json::json!({
                    "algorithms": algorithms,
                    "brushes": brushes,
                    "params": schema,
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Algorithms:");
                println!("  {}", algorithms.join(", "));
                println!("Brushes:");
                println!("  {}", brushes.join(", "));
                println!("Parameters:");
                if let Some(entries) = schema.as_object() {
                    for (name, entry) in entries {
                        println!(
                            "  {name:<22} {:>6}  {}",
                            entry["default"],
                            entry["description"].as_str().unwrap_or_default()
                        );
                    }
                }
            }
        }
        Command::Field {
            resolution,
            algorithm,
            noise_scale,
            seed,
        } => {
            let config = GridConfig {
                resolution,
                noise_scale,
                algorithm: algorithm.parse()?,
                ..GridConfig::default()
            };
            let grid = config.build(&mut Xorshift64::new(seed))?;

            if cli.json {
                let cells: Vec<[f64; 2]> = grid.cells().iter().map(|c| [c.x, c.y]).collect();
                let offset = grid.seed_offset();
                let info = serde_json::json!({
                    "resolution": resolution,
                    "algorithm": grid.algorithm(),
                    "seed": seed,
                    "seed_offset": [offset.x, offset.y],
                    "cells": cells,
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                for y in (0..resolution).rev() {
                    let row: String = (0..resolution).map(|x| arrow(grid.cell(x, y))).collect();
                    println!("{row}");
                }
            }
        }
        Command::Run {
            seed_file,
            population,
            resolution,
            width,
            height,
            algorithm,
            noise_scale,
            ticks,
            dt,
            seed,
            params,
            audio,
            brush,
            stroke,
            brush_radius,
            brush_strength,
        } => {
            let run_seed = match &seed_file {
                Some(path) => load_seed(path)?,
                None => {
                    let grid = GridConfig {
                        resolution,
                        size: [width, height],
                        noise_scale,
                        algorithm: algorithm.parse()?,
                        ..GridConfig::default()
                    };
                    seed_from_flags(grid, population, &params, seed, ticks, dt)?
                }
            };

            let stroke = match (brush, stroke) {
                (Some(mode), Some(segment)) => {
                    Some(build_stroke(&mode, &segment, brush_radius, brush_strength)?)
                }
                _ => None,
            };

            let mut sim = ParticleSimulation::from_seed(&run_seed)?;
            if let Some(stroke) = &stroke {
                paint_stroke(&mut sim, stroke);
            }
            if let Some(level) = audio {
                sim.set_audio_input(Some(Box::new(ConstantAudio(level))));
            }

            info!(
                population = run_seed.population,
                ticks = run_seed.ticks,
                seed = run_seed.seed,
                "starting run"
            );
            for t in 0..run_seed.ticks {
                sim.tick(run_seed.dt, t as f64 * run_seed.dt)?;
            }
            let stats = sim.stats();
            info!(
                respawns = stats.respawns,
                wraps = stats.wraps,
                "run finished"
            );

            if cli.json {
                let info = serde_json::json!({
                    "population": run_seed.population,
                    "ticks": run_seed.ticks,
                    "dt": run_seed.dt,
                    "seed": run_seed.seed,
                    "algorithm": sim.field().algorithm(),
                    "stats": stats,
                    "active": sim.active_count(),
                    "fading": sim.fading_count(),
                    "mean_speed": mean_speed(&sim),
                    "params": sim.params(),
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!(
                    "ran {} particles for {} ticks ({} field, seed {})",
                    run_seed.population,
                    run_seed.ticks,
                    sim.field().algorithm(),
                    run_seed.seed
                );
                println!(
                    "  respawns {}  wraps {}  fades completed {}",
                    stats.respawns, stats.wraps, stats.fades_completed
                );
                println!(
                    "  active {}  fading {}  mean speed {:.3}",
                    sim.active_count(),
                    sim.fading_count(),
                    mean_speed(&sim)
                );
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}
