use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use std::path::PathBuf;

use gas_common::{OutputFormat, SimulationConfig};
use gas_engine::output::open_sink;
use gas_engine::GasSimulation;

/// Snapshot output format for the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliOutputFormat {
    /// `!<frame>` marker followed by one row per molecule
    Csv,
    /// All snapshots as one JSON array
    Json,
    /// All snapshots, bincode encoded
    Bincode,
    /// All snapshots, MessagePack encoded
    #[value(name = "messagepack", alias = "msgpack")]
    MessagePack,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Csv => OutputFormat::Csv,
            CliOutputFormat::Json => OutputFormat::Json,
            CliOutputFormat::Bincode => OutputFormat::Bincode,
            CliOutputFormat::MessagePack => OutputFormat::MessagePack,
        }
    }
}

/// Command-line arguments for the gas engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a config.toml file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to run (overrides the config)
    #[arg(short, long)]
    frames: Option<u64>,

    /// Seed for the emission RNG (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// Output format (overrides the config)
    #[arg(long, value_enum)]
    format: Option<CliOutputFormat>,

    /// Output path without extension
    #[arg(short, long)]
    output: Option<String>,

    /// Only reflect off walls, skip molecule-molecule collisions
    #[arg(long)]
    no_particle_collisions: bool,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Gas Engine...");

    // --- Load Configuration ---
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => {
            info!("No config file given, using built-in defaults.");
            SimulationConfig::default()
        }
    };
    if let Some(frames) = args.frames {
        config.timing.frames = frames;
    }
    if let Some(seed) = args.seed {
        config.initial_conditions.seed = seed;
    }
    if let Some(format) = args.format {
        config.output.format = format.into();
    }
    if let Some(output) = &args.output {
        config.output.base_filename = output.clone();
    }
    if args.no_particle_collisions {
        config.physics.particle_collisions = false;
    }
    debug!("Configuration: {:#?}", config);

    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Initialize Simulation ---
    let frames = config.timing.frames;
    let format = config.output.format;
    let base_filename = config.output.base_filename.clone();
    let mut sim = GasSimulation::new(config).context("Failed to initialize simulation")?;
    info!(
        "Enclosure {}x{} | {} molecules | keyframe every {} frames.",
        sim.params().width,
        sim.params().height,
        sim.molecule_count(),
        sim.params().keyframe_interval
    );

    // --- Simulation Loop ---
    let mut sink = open_sink(format, &base_filename, sim.species())?;
    let snapshots = sim.run(frames, sink.as_mut())?;

    info!("Simulation Complete. {} snapshots written.", snapshots);
    Ok(())
}
