//! Type definitions for the simulation.
//!
//! Contains the data structures shared across the simulation core:
//! - Node identity, role, and position
//! - Spreading factors and their data-rate bucket mapping
//! - In-flight transmission records used by the interference model

use serde::Deserialize;

use super::scheduler::SimTime;

/// Identifier of a simulated node (end device, gateway, or network server).
pub type NodeId = u32;

/// Globally unique identifier of a transmitted packet.
pub type PacketId = u64;

/// LoRa spreading factor. Lower factors are faster (shorter airtime, shorter
/// range); higher factors are slower and more robust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpreadingFactor {
    SF7,
    SF8,
    SF9,
    SF10,
    SF11,
    SF12,
}

impl SpreadingFactor {
    /// All spreading factors, fastest first. The allocator walks this order
    /// to find the lowest viable factor.
    pub const ALL: [SpreadingFactor; 6] = [
        SpreadingFactor::SF7,
        SpreadingFactor::SF8,
        SpreadingFactor::SF9,
        SpreadingFactor::SF10,
        SpreadingFactor::SF11,
        SpreadingFactor::SF12,
    ];

    /// The numeric spreading factor (7..=12).
    pub fn value(self) -> u8 {
        match self {
            SpreadingFactor::SF7 => 7,
            SpreadingFactor::SF8 => 8,
            SpreadingFactor::SF9 => 9,
            SpreadingFactor::SF10 => 10,
            SpreadingFactor::SF11 => 11,
            SpreadingFactor::SF12 => 12,
        }
    }

    /// Statistics bucket index: 0 for SF7 (DR5, fastest) up to 5 for SF12
    /// (DR0, slowest). Matches the report's fastest-to-slowest line order.
    pub fn bucket_index(self) -> usize {
        (self.value() - 7) as usize
    }
}

impl std::fmt::Display for SpreadingFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SF{}", self.value())
    }
}

/// 3D position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point3 { x, y, z }
    }

    /// Euclidean distance to another point, in meters.
    pub fn distance(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl std::fmt::Display for Point3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Runtime state of an end device.
#[derive(Debug, Clone, Default)]
pub struct EndDeviceState {
    /// Assigned spreading factor. Must be set by the allocator before the
    /// device's first transmission.
    pub spreading_factor: Option<SpreadingFactor>,
    /// Set after a protocol violation; a faulted device skips all further
    /// transmissions while the rest of the run continues.
    pub faulted: bool,
}

/// Node role as a tagged variant. Each variant carries only the state its
/// role needs; dispatch is by pattern matching, not virtual calls.
#[derive(Debug, Clone)]
pub enum Role {
    EndDevice(EndDeviceState),
    Gateway,
    /// The network server has no radio; the backhaul between gateways and
    /// server is assumed reliable and out of scope.
    NetworkServer,
}

/// A simulated node: identity, role, and (for radio roles) a position.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub role: Role,
    position: Point3,
}

impl Node {
    pub fn end_device(id: NodeId, position: Point3) -> Self {
        Node {
            id,
            role: Role::EndDevice(EndDeviceState::default()),
            position,
        }
    }

    pub fn gateway(id: NodeId, position: Point3) -> Self {
        Node {
            id,
            role: Role::Gateway,
            position,
        }
    }

    pub fn network_server(id: NodeId) -> Self {
        Node {
            id,
            role: Role::NetworkServer,
            position: Point3::default(),
        }
    }

    /// Radio position of the node. `None` for the network server, which has
    /// no radio presence.
    pub fn position(&self) -> Option<Point3> {
        match self.role {
            Role::EndDevice(_) | Role::Gateway => Some(self.position),
            Role::NetworkServer => None,
        }
    }

    /// Move the node. Returns false (and changes nothing) for the network
    /// server, which cannot be placed.
    pub fn set_position(&mut self, position: Point3) -> bool {
        match self.role {
            Role::EndDevice(_) | Role::Gateway => {
                self.position = position;
                true
            }
            Role::NetworkServer => false,
        }
    }
}

/// One transmission as observed at a single gateway.
///
/// Created when a device starts transmitting (with the arrival window shifted
/// by the propagation delay to that gateway), consulted by the interference
/// model while any overlapping window is still open, and pruned once no
/// unresolved transmission can overlap it anymore.
#[derive(Debug, Clone)]
pub struct TransmissionRecord {
    pub packet_id: PacketId,
    pub sender: NodeId,
    pub spreading_factor: SpreadingFactor,
    /// Start of the reception window at the gateway.
    pub start_time: SimTime,
    /// On-air duration of the packet.
    pub duration: SimTime,
    /// Whether this record's own window-close event has been handled.
    pub resolved: bool,
}

impl TransmissionRecord {
    /// End of the reception window (exclusive).
    pub fn end_time(&self) -> SimTime {
        self.start_time + self.duration
    }

    /// Half-open interval overlap test: `[start, end)` windows that merely
    /// touch do not overlap.
    pub fn overlaps(&self, other: &TransmissionRecord) -> bool {
        self.start_time < other.end_time() && other.start_time < self.end_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start_secs: u64, duration_secs: u64) -> TransmissionRecord {
        TransmissionRecord {
            packet_id: 1,
            sender: 0,
            spreading_factor: SpreadingFactor::SF7,
            start_time: SimTime::from_secs(start_secs),
            duration: SimTime::from_secs(duration_secs),
            resolved: false,
        }
    }

    #[test]
    fn bucket_indices_run_fastest_to_slowest() {
        assert_eq!(SpreadingFactor::SF7.bucket_index(), 0);
        assert_eq!(SpreadingFactor::SF12.bucket_index(), 5);
        for (i, sf) in SpreadingFactor::ALL.iter().enumerate() {
            assert_eq!(sf.bucket_index(), i);
        }
    }

    #[test]
    fn overlap_is_half_open() {
        let a = record(0, 10);
        let b = record(5, 10);
        let c = record(10, 5);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        // Touching intervals do not overlap
        assert!(!a.overlaps(&c));
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn network_server_has_no_position() {
        let mut server = Node::network_server(99);
        assert!(server.position().is_none());
        assert!(!server.set_position(Point3::new(1.0, 2.0, 3.0)));

        let mut device = Node::end_device(0, Point3::default());
        assert!(device.set_position(Point3::new(1.0, 1.0, 0.0)));
        assert_eq!(device.position().unwrap(), Point3::new(1.0, 1.0, 0.0));
    }
}
