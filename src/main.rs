//! ALOHA throughput simulator for LoRa networks.
//!
//! Runs a seeded discrete-event simulation of periodic uplink traffic from a
//! set of end devices to one or more gateways, resolving packet collisions
//! with a pluggable interference matrix, and prints per-spreading-factor
//! sent/received counts.

mod config;
mod mobility;
mod scenario;
mod simulation;

use std::path::PathBuf;

use clap::Parser;
use log::{LevelFilter, info};

use crate::config::SimulationConfig;
use crate::mobility::MobilityTrace;
use crate::scenario::{Scenario, load_scenario};
use crate::simulation::Simulation;

#[derive(Parser, Debug)]
#[command(name = "lora-aloha-sim", about = "LoRa ALOHA throughput simulator", version)]
struct Args {
    /// Number of end devices
    #[arg(long = "nDevices", default_value_t = 50)]
    n_devices: u32,

    /// Number of gateways
    #[arg(long = "nGateways", default_value_t = 1)]
    n_gateways: u32,

    /// Application traffic window in seconds (also the per-device period)
    #[arg(long = "simulationTime", default_value_t = 50.0)]
    simulation_time: f64,

    /// Interference matrix: 'aloha' or 'goursaud'
    #[arg(long = "interferenceMatrix", default_value = "aloha")]
    interference_matrix: String,

    /// Mobility trace file (node_id time x y z per line)
    #[arg(long = "traceFile")]
    trace_file: Option<PathBuf>,

    /// Seed for traffic offsets and shadowing
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Optional JSON scenario overriding radio and physics parameters
    #[arg(long)]
    scenario: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::new().filter_level(LevelFilter::Info).init();

    let args = Args::parse();

    let scenario = match &args.scenario {
        Some(path) => load_scenario(path)?,
        None => Scenario::default(),
    };

    let config = SimulationConfig {
        n_devices: args.n_devices,
        n_gateways: args.n_gateways,
        simulation_time_secs: args.simulation_time,
        collision_matrix: config::resolve_collision_matrix(&args.interference_matrix),
        trace_file: args.trace_file.clone(),
        seed: args.seed,
        scenario,
    };
    config.validate()?;

    let trace = match &config.trace_file {
        Some(path) => MobilityTrace::load(path)?,
        None => MobilityTrace::default(),
    };

    info!(
        "Starting run: {} device(s), {} gateway(s), {}s window, '{}' interference, seed {}",
        config.n_devices, config.n_gateways, config.simulation_time_secs, config.collision_matrix, config.seed
    );

    let mut simulation = Simulation::build(&config, &trace)?;
    let table = simulation.run_to_completion()?;

    // One line per spreading factor, fastest (SF7) first: "<sent> <received>"
    for bucket in table {
        println!("{} {}", bucket.sent, bucket.received);
    }

    Ok(())
}
