//! Discrete-event simulation core.
//!
//! Modules:
//! - `scheduler`: the time-ordered event queue and virtual clock
//! - `types`: nodes, roles, spreading factors, transmission records
//! - `signal_calculations`: path loss, airtime, sensitivities
//! - `channel`: propagation and the collision matrix
//! - `allocator`: spreading-factor assignment
//! - `network`: shared world state and event dispatch
//! - `stats`: per-spreading-factor counters behind observer interfaces

pub mod allocator;
pub mod channel;
pub mod network;
pub mod scheduler;
pub mod signal_calculations;
pub mod stats;
pub mod types;

use anyhow::Context;
use log::info;

use crate::config::SimulationConfig;
use crate::mobility::MobilityTrace;
use crate::simulation::channel::Channel;
use crate::simulation::network::{Action, Network, NetworkParams};
use crate::simulation::scheduler::{Scheduler, SimTime};
use crate::simulation::stats::{StatisticsCollector, StatisticsTable};

/// Grace period after the application stop during which in-flight reception
/// windows may still close (one hour, as in the reference scenario).
const TEARDOWN_GRACE_SECS: u64 = 3600;

/// A fully wired simulation: scheduler plus network state.
pub struct Simulation {
    scheduler: Scheduler<Action>,
    network: Network,
    stop_time: SimTime,
}

impl Simulation {
    /// Build the node population, install mobility, assign spreading
    /// factors, and schedule the initial traffic.
    ///
    /// Node ids follow the reference layout: devices `0..n_devices`, then
    /// gateways, then the network server.
    pub fn build(config: &SimulationConfig, trace: &MobilityTrace) -> anyhow::Result<Simulation> {
        let app_stop = SimTime::from_secs_f64(config.simulation_time_secs);
        let params = NetworkParams {
            channel: Channel::new(config.scenario.path_loss_parameters.clone()),
            lora: config.scenario.lora_parameters.clone(),
            collision_matrix: config.collision_matrix,
            app_period_secs: config.simulation_time_secs,
            app_stop,
            payload_size: config.scenario.payload_size,
            tx_power_dbm: config.scenario.tx_power_dbm,
            seed: config.seed,
        };
        let mut network = Network::new(params, StatisticsCollector::new());

        for id in 0..config.n_devices {
            network.add_end_device(id, types::Point3::default());
        }
        for index in 0..config.n_gateways {
            let id = config.n_devices + index;
            network.add_gateway(id, config.scenario.gateway_position(index as usize));
        }
        network.add_network_server(config.n_devices + config.n_gateways);

        let mut scheduler = Scheduler::new();

        // Initial positions must be in place before path loss is estimated,
        // so the trace is installed ahead of spreading-factor assignment.
        trace.install(network.nodes_mut(), &mut scheduler).context("Failed to install mobility trace")?;

        let channel = network.channel().clone();
        let tx_power_dbm = network.tx_power_dbm();
        let mut setup_rng = network.setup_rng();
        allocator::assign_spreading_factors(network.nodes_mut(), &channel, tx_power_dbm, &mut setup_rng);

        network.start(&mut scheduler).context("Failed to schedule initial traffic")?;

        Ok(Simulation {
            scheduler,
            network,
            stop_time: app_stop + SimTime::from_secs(TEARDOWN_GRACE_SECS),
        })
    }

    /// Dispatch events in time order until the given stop time. May be
    /// called repeatedly with increasing stop times.
    pub fn run_until(&mut self, stop_time: SimTime) -> anyhow::Result<()> {
        while let Some((time, action)) = self.scheduler.pop_due(stop_time) {
            self.network.dispatch(&mut self.scheduler, time, action)?;
        }
        Ok(())
    }

    /// Run the whole simulation and tear down the diagnostic loop.
    pub fn run_to_completion(&mut self) -> anyhow::Result<StatisticsTable> {
        info!("Running simulation until {}", self.stop_time);
        self.run_until(self.stop_time)?;
        self.network.shutdown(&mut self.scheduler);
        if !self.network.violations().is_empty() {
            info!("Run completed with {} protocol violation(s)", self.network.violations().len());
        }
        Ok(self.network.statistics().snapshot())
    }

    pub fn network(&self) -> &Network {
        &self.network
    }
}
