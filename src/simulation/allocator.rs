//! Spreading-factor allocation.
//!
//! Assigns each end device the lowest (fastest) spreading factor whose
//! receiver sensitivity is met at the strongest gateway, estimated from the
//! path loss model at the device's current position. Devices out of range of
//! every threshold fall back to SF12, the most robust factor.

use std::collections::BTreeMap;

use log::debug;
use rand::rngs::StdRng;

use super::channel::Channel;
use super::signal_calculations::receiver_sensitivity_dbm;
use super::types::{Node, NodeId, Role, SpreadingFactor};

/// Assign spreading factors to every end device in `nodes`.
///
/// For each device the minimum path loss to any gateway is estimated, and the
/// lowest spreading factor with `tx_power − loss ≥ sensitivity` is selected.
/// Idempotent: invoking it again only overwrites the assignments, so it can
/// be re-run later (e.g. after mobility has moved devices) without other side
/// effects.
pub fn assign_spreading_factors(
    nodes: &mut BTreeMap<NodeId, Node>,
    channel: &Channel,
    tx_power_dbm: f64,
    rng: &mut StdRng,
) {
    let gateway_positions: Vec<_> = nodes
        .values()
        .filter_map(|node| match node.role {
            Role::Gateway => node.position(),
            _ => None,
        })
        .collect();

    for node in nodes.values_mut() {
        let Some(device_position) = node.position() else { continue };
        let Role::EndDevice(state) = &mut node.role else { continue };

        let min_loss = gateway_positions
            .iter()
            .map(|gw| channel.path_loss_db(&device_position, gw, rng))
            .fold(f64::INFINITY, f64::min);

        let received_power = tx_power_dbm - min_loss;
        let assigned = SpreadingFactor::ALL
            .into_iter()
            .find(|sf| received_power >= receiver_sensitivity_dbm(*sf))
            .unwrap_or(SpreadingFactor::SF12);

        debug!(
            "Node {}: estimated loss {:.1} dB, rx power {:.1} dBm, assigned {}",
            node.id, min_loss, received_power, assigned
        );
        state.spreading_factor = Some(assigned);
    }
}
