//! Network model: nodes, traffic generation, and reception resolution.
//!
//! The `Network` owns all shared simulation state and mutates it exclusively
//! inside `dispatch`, which the runner calls for exactly one event at a time.
//! That single-writer contract is what makes the model race-free without any
//! locks.
//!
//! High-level flow per event:
//! - `DeviceWakeup`: an end device starts a transmission (records registered
//!   at every gateway with the propagation delay applied) and reschedules its
//!   next wakeup one application period later.
//! - `TransmissionEnded`: a reception window closed at a gateway; the
//!   collision matrix decides the packet's fate against every overlapping
//!   record, then records nothing can overlap anymore are pruned.
//! - `PositionUpdate`: mobility moves a node (instantaneous jump).
//! - `PositionReport`: diagnostic logging of all positions, self-rescheduling
//!   on a fixed cadence; observability only, never affects outcomes.

use std::collections::{BTreeMap, HashSet};

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::channel::{Channel, CollisionMatrix, ReceptionOutcome, resolve_outcome};
use super::scheduler::{EventHandle, Scheduler, SchedulingError, SimTime};
use super::signal_calculations::{LoraParameters, calculate_air_time};
use super::stats::{ReceptionObserver, StatisticsCollector, TransmissionObserver};
use super::types::{Node, NodeId, PacketId, Point3, Role, TransmissionRecord};

/// Cadence of the diagnostic position report, in virtual seconds.
const POSITION_REPORT_PERIOD_SECS: f64 = 10.0;

/// Events dispatched by the scheduler against the network state.
#[derive(Debug, Clone)]
pub enum Action {
    /// An end device's periodic traffic generator fires.
    DeviceWakeup { device: NodeId },
    /// A reception window closed at a gateway.
    TransmissionEnded { gateway: NodeId, packet: PacketId },
    /// Mobility waypoint reached: move the node.
    PositionUpdate { node: NodeId, position: Point3 },
    /// Periodic diagnostic log of all node positions.
    PositionReport,
}

/// A recorded, non-fatal protocol violation. The offending node is faulted
/// (its further transmissions are skipped) but the run continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolViolation {
    pub node: NodeId,
    pub time: SimTime,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// A device reached its first transmission without an assigned
    /// spreading factor.
    MissingSpreadingFactor,
    /// A gateway saw a packet id that is already in flight there.
    DuplicatePacketInFlight { packet: PacketId, gateway: NodeId },
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::MissingSpreadingFactor => write!(f, "no spreading factor assigned before first transmission"),
            ViolationKind::DuplicatePacketInFlight { packet, gateway } => {
                write!(f, "packet {packet} already in flight at gateway {gateway}")
            }
        }
    }
}

/// Construction-time parameters of the network model.
#[derive(Debug, Clone)]
pub struct NetworkParams {
    pub channel: Channel,
    pub lora: LoraParameters,
    pub collision_matrix: CollisionMatrix,
    /// Application traffic period per device, in seconds.
    pub app_period_secs: f64,
    /// Devices stop generating traffic at this time.
    pub app_stop: SimTime,
    /// Application payload size in bytes.
    pub payload_size: usize,
    pub tx_power_dbm: f64,
    /// Seed for device start offsets (and shadowing, when enabled).
    pub seed: u64,
}

/// All shared simulation state: the node set, per-gateway in-flight
/// transmissions, and the statistics collector.
pub struct Network {
    nodes: BTreeMap<NodeId, Node>,
    /// In-flight (and recently closed, still-overlapping) records per gateway.
    in_flight: BTreeMap<NodeId, Vec<TransmissionRecord>>,
    stats: StatisticsCollector,
    /// Packets already counted as received. A packet is registered at every
    /// gateway but must count at most once, no matter how many gateways
    /// decode it.
    counted_received: HashSet<PacketId>,
    params: NetworkParams,
    rng: StdRng,
    next_packet_id: PacketId,
    violations: Vec<ProtocolViolation>,
    position_report_handle: Option<EventHandle>,
}

impl Network {
    /// Create an empty network. The statistics collector is injected here and
    /// addressed only through the observer interfaces afterwards.
    pub fn new(params: NetworkParams, stats: StatisticsCollector) -> Self {
        let rng = StdRng::seed_from_u64(params.seed);
        Network {
            nodes: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            stats,
            counted_received: HashSet::new(),
            params,
            rng,
            next_packet_id: 1,
            violations: Vec::new(),
            position_report_handle: None,
        }
    }

    pub fn add_end_device(&mut self, id: NodeId, position: Point3) {
        self.nodes.insert(id, Node::end_device(id, position));
    }

    pub fn add_gateway(&mut self, id: NodeId, position: Point3) {
        self.nodes.insert(id, Node::gateway(id, position));
        self.in_flight.insert(id, Vec::new());
    }

    pub fn add_network_server(&mut self, id: NodeId) {
        self.nodes.insert(id, Node::network_server(id));
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, Node> {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut BTreeMap<NodeId, Node> {
        &mut self.nodes
    }

    pub fn channel(&self) -> &Channel {
        &self.params.channel
    }

    pub fn tx_power_dbm(&self) -> f64 {
        self.params.tx_power_dbm
    }

    pub fn statistics(&self) -> &StatisticsCollector {
        &self.stats
    }

    pub fn violations(&self) -> &[ProtocolViolation] {
        &self.violations
    }

    /// Derive a seeded generator for setup-time use (spreading-factor
    /// estimation with shadowing). Kept separate from the traffic generator
    /// stream so allocation never perturbs wakeup offsets.
    pub fn setup_rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.params.seed.wrapping_add(1))
    }

    /// Schedule the initial wakeup of every end device (uniformly random
    /// offset within the first application period, drawn in node-id order for
    /// reproducibility) and the first diagnostic position report.
    pub fn start(&mut self, scheduler: &mut Scheduler<Action>) -> Result<(), SchedulingError> {
        let device_ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| matches!(n.role, Role::EndDevice(_)))
            .map(|n| n.id)
            .collect();
        for device in device_ids {
            let offset = self.rng.gen_range(0.0..self.params.app_period_secs);
            scheduler.schedule_in(offset, Action::DeviceWakeup { device })?;
        }
        let handle = scheduler.schedule_in(POSITION_REPORT_PERIOD_SECS, Action::PositionReport)?;
        self.position_report_handle = Some(handle);
        Ok(())
    }

    /// Tear down the self-rescheduling diagnostic loop. Safe to call whether
    /// or not the loop's next event already fired.
    pub fn shutdown(&mut self, scheduler: &mut Scheduler<Action>) {
        if let Some(handle) = self.position_report_handle.take() {
            scheduler.cancel(handle);
        }
    }

    /// Handle one event. Every mutation of shared state happens inside this
    /// call, for exactly one event at a time.
    pub fn dispatch(&mut self, scheduler: &mut Scheduler<Action>, now: SimTime, action: Action) -> Result<(), SchedulingError> {
        match action {
            Action::DeviceWakeup { device } => self.handle_device_wakeup(scheduler, now, device),
            Action::TransmissionEnded { gateway, packet } => {
                self.handle_transmission_ended(now, gateway, packet);
                Ok(())
            }
            Action::PositionUpdate { node, position } => {
                self.handle_position_update(now, node, position);
                Ok(())
            }
            Action::PositionReport => self.handle_position_report(scheduler, now),
        }
    }

    fn record_violation(&mut self, node: NodeId, time: SimTime, kind: ViolationKind) {
        error!("Protocol violation by node {node} at {time}: {kind}");
        self.violations.push(ProtocolViolation { node, time, kind });
        if let Some(offender) = self.nodes.get_mut(&node) {
            if let Role::EndDevice(state) = &mut offender.role {
                state.faulted = true;
            }
        }
    }

    fn handle_device_wakeup(&mut self, scheduler: &mut Scheduler<Action>, now: SimTime, device: NodeId) -> Result<(), SchedulingError> {
        if now >= self.params.app_stop {
            // Application stopped; do not transmit, do not reschedule.
            return Ok(());
        }

        let wakeup_state = {
            let Some(node) = self.nodes.get(&device) else {
                warn!("Wakeup for unknown node {device}");
                return Ok(());
            };
            let Role::EndDevice(state) = &node.role else {
                warn!("Wakeup for non-device node {device}");
                return Ok(());
            };
            if state.faulted {
                debug!("Node {device} is faulted, skipping transmission");
                return Ok(());
            }
            state.spreading_factor.map(|sf| (node.position().unwrap_or_default(), sf))
        };
        let Some((device_position, spreading_factor)) = wakeup_state else {
            self.record_violation(device, now, ViolationKind::MissingSpreadingFactor);
            return Ok(());
        };

        let packet_id = self.next_packet_id;
        self.next_packet_id += 1;

        let airtime_secs = calculate_air_time(spreading_factor, self.params.payload_size, &self.params.lora);

        let gateways: Vec<(NodeId, Point3)> = self
            .nodes
            .values()
            .filter_map(|n| match n.role {
                Role::Gateway => n.position().map(|p| (n.id, p)),
                _ => None,
            })
            .collect();

        // A duplicate packet id anywhere aborts the whole transmission before
        // any gateway registration or counting, so no partial windows linger.
        let duplicate_at = gateways.iter().map(|&(gateway, _)| gateway).find(|gateway| {
            self.in_flight
                .get(gateway)
                .is_some_and(|records| records.iter().any(|r| r.packet_id == packet_id))
        });
        if let Some(gateway) = duplicate_at {
            self.record_violation(device, now, ViolationKind::DuplicatePacketInFlight { packet: packet_id, gateway });
            return Ok(());
        }

        debug!("Node {device} starts transmitting packet {packet_id} ({spreading_factor}, {airtime_secs:.4}s airtime) at {now}");
        self.stats.on_transmission_started(spreading_factor);

        // Register the reception window at every gateway, shifted by that
        // gateway's propagation delay. Positions are captured at start time;
        // later mobility does not retroactively move a window.
        for (gateway, gateway_position) in gateways {
            let delay_secs = self.params.channel.propagation_delay_secs(&device_position, &gateway_position);
            let start_time = now.offset_secs(delay_secs);
            let record = TransmissionRecord {
                packet_id,
                sender: device,
                spreading_factor,
                start_time,
                duration: SimTime::from_secs_f64(airtime_secs),
                resolved: false,
            };
            let end_time = record.end_time();
            self.in_flight.entry(gateway).or_default().push(record);
            scheduler.schedule_at(end_time, Action::TransmissionEnded { gateway, packet: packet_id })?;
        }

        // Periodic self-rescheduling traffic. Wakeups past the application
        // stop are guarded above; ones past the run's stop time are simply
        // dropped at teardown.
        scheduler.schedule_in(self.params.app_period_secs, Action::DeviceWakeup { device })?;
        Ok(())
    }

    fn handle_transmission_ended(&mut self, now: SimTime, gateway: NodeId, packet: PacketId) {
        let Some(records) = self.in_flight.get_mut(&gateway) else {
            warn!("Transmission end at unknown gateway {gateway}");
            return;
        };
        let Some(index) = records.iter().position(|r| r.packet_id == packet) else {
            warn!("Transmission end for unknown packet {packet} at gateway {gateway}");
            return;
        };

        let closing = records[index].clone();
        let outcome = resolve_outcome(&closing, records, self.params.collision_matrix);
        records[index].resolved = true;

        match outcome {
            ReceptionOutcome::Received => {
                debug!("Gateway {gateway} received packet {packet} from node {} at {now}", closing.sender);
                // With several gateways the same packet can be decoded more
                // than once; it still counts as one reception.
                if self.counted_received.insert(packet) {
                    self.stats.on_packet_received(closing.spreading_factor);
                }
            }
            ReceptionOutcome::Lost { interferers } => {
                debug!(
                    "Gateway {gateway} lost packet {packet} from node {} to interference from {interferers:?}",
                    closing.sender
                );
            }
        }

        // Prune resolved records that can no longer interfere with anything.
        // A resolved record must survive as long as any unresolved window
        // started before its end; unresolved windows all began at or before
        // the current time, so this bound is exact.
        let earliest_unresolved_start = records.iter().filter(|r| !r.resolved).map(|r| r.start_time).min();
        match earliest_unresolved_start {
            Some(start) => records.retain(|r| !r.resolved || r.end_time() > start),
            None => records.clear(),
        }
    }

    fn handle_position_update(&mut self, now: SimTime, node_id: NodeId, position: Point3) {
        match self.nodes.get_mut(&node_id) {
            Some(node) => {
                if node.set_position(position) {
                    debug!("Node {node_id} moved to {position} at {now}");
                } else {
                    warn!("Position update for the network server (node {node_id}) ignored");
                }
            }
            None => warn!("Position update for unknown node {node_id}"),
        }
    }

    fn handle_position_report(&mut self, scheduler: &mut Scheduler<Action>, now: SimTime) -> Result<(), SchedulingError> {
        for node in self.nodes.values() {
            if let Some(position) = node.position() {
                info!("t={now} node {} position: {position}", node.id);
            }
        }
        let handle = scheduler.schedule_in(POSITION_REPORT_PERIOD_SECS, Action::PositionReport)?;
        self.position_report_handle = Some(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::signal_calculations::PathLossParameters;
    use crate::simulation::types::SpreadingFactor;

    const STOP: SimTime = SimTime::from_secs(50);
    const GRACE: SimTime = SimTime::from_secs(3650);

    fn params(matrix: CollisionMatrix) -> NetworkParams {
        NetworkParams {
            channel: Channel::new(PathLossParameters::default()),
            lora: LoraParameters::default(),
            collision_matrix: matrix,
            app_period_secs: 50.0,
            app_stop: STOP,
            payload_size: 50,
            tx_power_dbm: 14.0,
            seed: 1,
        }
    }

    /// Two end devices close to one gateway, spreading factors preassigned.
    fn two_device_network(matrix: CollisionMatrix, sf_a: SpreadingFactor, sf_b: SpreadingFactor) -> Network {
        let mut network = Network::new(params(matrix), StatisticsCollector::new());
        network.add_end_device(0, Point3::new(100.0, 0.0, 0.0));
        network.add_end_device(1, Point3::new(0.0, 100.0, 0.0));
        network.add_gateway(2, Point3::new(0.0, 0.0, 15.0));
        network.add_network_server(3);
        set_sf(&mut network, 0, sf_a);
        set_sf(&mut network, 1, sf_b);
        network
    }

    fn set_sf(network: &mut Network, id: NodeId, sf: SpreadingFactor) {
        if let Role::EndDevice(state) = &mut network.nodes_mut().get_mut(&id).unwrap().role {
            state.spreading_factor = Some(sf);
        }
    }

    fn run(network: &mut Network, scheduler: &mut Scheduler<Action>, stop: SimTime) {
        while let Some((time, action)) = scheduler.pop_due(stop) {
            network.dispatch(scheduler, time, action).unwrap();
        }
    }

    #[test]
    fn lone_transmission_is_received() {
        let mut network = two_device_network(CollisionMatrix::Aloha, SpreadingFactor::SF7, SpreadingFactor::SF7);
        let mut scheduler = Scheduler::new();
        scheduler.schedule_in(1.0, Action::DeviceWakeup { device: 0 }).unwrap();
        run(&mut network, &mut scheduler, GRACE);

        assert_eq!(network.statistics().total_sent(), 1);
        assert_eq!(network.statistics().total_received(), 1);
    }

    #[test]
    fn aloha_overlap_destroys_both() {
        let mut network = two_device_network(CollisionMatrix::Aloha, SpreadingFactor::SF7, SpreadingFactor::SF12);
        let mut scheduler = Scheduler::new();
        // SF7 airtime is ~0.1 s and SF12 over a second, so simultaneous
        // starts guarantee overlapping windows at the gateway.
        scheduler.schedule_in(1.0, Action::DeviceWakeup { device: 0 }).unwrap();
        scheduler.schedule_in(1.0, Action::DeviceWakeup { device: 1 }).unwrap();
        run(&mut network, &mut scheduler, GRACE);

        assert_eq!(network.statistics().total_sent(), 2);
        assert_eq!(network.statistics().total_received(), 0);
    }

    #[test]
    fn goursaud_overlap_with_different_factors_receives_both() {
        let mut network = two_device_network(CollisionMatrix::Goursaud, SpreadingFactor::SF7, SpreadingFactor::SF12);
        let mut scheduler = Scheduler::new();
        scheduler.schedule_in(1.0, Action::DeviceWakeup { device: 0 }).unwrap();
        scheduler.schedule_in(1.0, Action::DeviceWakeup { device: 1 }).unwrap();
        run(&mut network, &mut scheduler, GRACE);

        assert_eq!(network.statistics().total_sent(), 2);
        assert_eq!(network.statistics().total_received(), 2);
    }

    #[test]
    fn goursaud_overlap_with_same_factor_destroys_both() {
        let mut network = two_device_network(CollisionMatrix::Goursaud, SpreadingFactor::SF9, SpreadingFactor::SF9);
        let mut scheduler = Scheduler::new();
        scheduler.schedule_in(1.0, Action::DeviceWakeup { device: 0 }).unwrap();
        scheduler.schedule_in(1.0, Action::DeviceWakeup { device: 1 }).unwrap();
        run(&mut network, &mut scheduler, GRACE);

        assert_eq!(network.statistics().total_sent(), 2);
        assert_eq!(network.statistics().total_received(), 0);
    }

    #[test]
    fn packet_decoded_by_two_gateways_counts_once() {
        // One device in range of two gateways: both decode the lone packet,
        // but conservation demands received <= sent.
        let mut network = Network::new(params(CollisionMatrix::Aloha), StatisticsCollector::new());
        network.add_end_device(0, Point3::new(50.0, 0.0, 0.0));
        network.add_gateway(1, Point3::new(0.0, 0.0, 15.0));
        network.add_gateway(2, Point3::new(100.0, 0.0, 15.0));
        network.add_network_server(3);
        set_sf(&mut network, 0, SpreadingFactor::SF7);

        let mut scheduler = Scheduler::new();
        scheduler.schedule_in(1.0, Action::DeviceWakeup { device: 0 }).unwrap();
        run(&mut network, &mut scheduler, GRACE);

        assert_eq!(network.statistics().total_sent(), 1);
        assert_eq!(network.statistics().total_received(), 1);
    }

    #[test]
    fn duplicate_packet_id_aborts_before_any_registration() {
        let mut network = two_device_network(CollisionMatrix::Aloha, SpreadingFactor::SF7, SpreadingFactor::SF7);
        // Plant a record carrying the id the next transmission will take.
        let planted = TransmissionRecord {
            packet_id: network.next_packet_id,
            sender: 1,
            spreading_factor: SpreadingFactor::SF7,
            start_time: SimTime::ZERO,
            duration: SimTime::from_secs(100),
            resolved: false,
        };
        network.in_flight.get_mut(&2).unwrap().push(planted);

        let mut scheduler = Scheduler::new();
        scheduler.schedule_in(1.0, Action::DeviceWakeup { device: 0 }).unwrap();
        run(&mut network, &mut scheduler, GRACE);

        // Violation recorded, nothing counted, and no window was registered
        // anywhere: only the planted record remains.
        assert_eq!(network.violations().len(), 1);
        assert!(matches!(
            network.violations()[0].kind,
            ViolationKind::DuplicatePacketInFlight { .. }
        ));
        assert_eq!(network.statistics().total_sent(), 0);
        assert_eq!(network.in_flight[&2].len(), 1);
    }

    #[test]
    fn device_without_spreading_factor_is_faulted_not_fatal() {
        let mut network = Network::new(params(CollisionMatrix::Aloha), StatisticsCollector::new());
        network.add_end_device(0, Point3::new(100.0, 0.0, 0.0));
        network.add_gateway(1, Point3::new(0.0, 0.0, 15.0));
        let mut scheduler = Scheduler::new();
        scheduler.schedule_in(1.0, Action::DeviceWakeup { device: 0 }).unwrap();
        scheduler.schedule_in(2.0, Action::DeviceWakeup { device: 0 }).unwrap();
        run(&mut network, &mut scheduler, GRACE);

        assert_eq!(network.statistics().total_sent(), 0);
        assert_eq!(network.violations().len(), 1);
        assert_eq!(network.violations()[0].kind, ViolationKind::MissingSpreadingFactor);
    }

    #[test]
    fn scenario_fifty_devices_send_once_within_one_period() {
        // 50 end devices, 1 gateway, 50 s period, aloha policy: each device
        // transmits exactly once when simulationTime == appPeriod.
        let mut network = Network::new(params(CollisionMatrix::Aloha), StatisticsCollector::new());
        for id in 0..50 {
            network.add_end_device(id, Point3::new((id as f64) * 10.0, 0.0, 0.0));
        }
        network.add_gateway(50, Point3::new(0.0, 0.0, 15.0));
        network.add_network_server(51);
        for id in 0..50 {
            set_sf(&mut network, id, SpreadingFactor::SF7);
        }

        let mut scheduler = Scheduler::new();
        network.start(&mut scheduler).unwrap();
        run(&mut network, &mut scheduler, GRACE);
        network.shutdown(&mut scheduler);

        assert_eq!(network.statistics().total_sent(), 50);
        assert!(network.statistics().total_received() <= 50);
    }

    #[test]
    fn identical_seeds_reproduce_identical_statistics() {
        let build_and_run = || {
            let mut network = Network::new(params(CollisionMatrix::Aloha), StatisticsCollector::new());
            for id in 0..20 {
                network.add_end_device(id, Point3::new((id as f64) * 50.0, 0.0, 0.0));
            }
            network.add_gateway(20, Point3::new(0.0, 0.0, 15.0));
            for id in 0..20 {
                set_sf(&mut network, id, SpreadingFactor::SF8);
            }
            let mut scheduler = Scheduler::new();
            network.start(&mut scheduler).unwrap();
            run(&mut network, &mut scheduler, GRACE);
            network.statistics().snapshot()
        };

        assert_eq!(build_and_run(), build_and_run());
    }

    #[test]
    fn received_never_exceeds_sent_per_bucket() {
        let mut network = two_device_network(CollisionMatrix::Aloha, SpreadingFactor::SF7, SpreadingFactor::SF7);
        let mut scheduler = Scheduler::new();
        network.start(&mut scheduler).unwrap();
        run(&mut network, &mut scheduler, GRACE);

        for bucket in network.statistics().snapshot() {
            assert!(bucket.received <= bucket.sent);
        }
    }

    #[test]
    fn mobility_updates_apply_at_waypoint_times() {
        let mut network = two_device_network(CollisionMatrix::Aloha, SpreadingFactor::SF7, SpreadingFactor::SF7);
        let mut scheduler = Scheduler::new();
        scheduler
            .schedule_at(SimTime::from_secs(5), Action::PositionUpdate { node: 0, position: Point3::new(1.0, 1.0, 0.0) })
            .unwrap();
        scheduler
            .schedule_at(SimTime::from_secs(15), Action::PositionUpdate { node: 0, position: Point3::new(2.0, 2.0, 0.0) })
            .unwrap();

        run(&mut network, &mut scheduler, SimTime::from_secs(10));
        assert_eq!(network.nodes()[&0].position().unwrap(), Point3::new(1.0, 1.0, 0.0));

        run(&mut network, &mut scheduler, SimTime::from_secs(20));
        assert_eq!(network.nodes()[&0].position().unwrap(), Point3::new(2.0, 2.0, 0.0));
    }
}
