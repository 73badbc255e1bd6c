//! Channel and interference model.
//!
//! The channel computes propagation delay and path loss between radio
//! positions, and resolves reception outcomes when a transmission window
//! closes at a gateway. Interference is decided pairwise by a fixed
//! `CollisionMatrix`: two time-overlapping transmissions either destroy each
//! other or coexist, depending on the matrix variant and their spreading
//! factors. There is no per-packet independent loss; a transmission with no
//! destructive overlap is always received.
//!
//! The channel owns no transmission state. The live set of in-flight
//! `TransmissionRecord`s is maintained by the network model and passed in.

use rand::rngs::StdRng;

use super::signal_calculations::{self, PathLossParameters};
use super::types::{PacketId, Point3, SpreadingFactor, TransmissionRecord};

/// Pairwise interference verdict table.
///
/// - `Aloha`: the most conservative model; any temporal overlap at a gateway
///   is mutually destructive regardless of spreading factor.
/// - `Goursaud`: transmissions on the same spreading factor destroy each
///   other, while different factors are treated as quasi-orthogonal and may
///   both be received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionMatrix {
    #[default]
    Aloha,
    Goursaud,
}

impl CollisionMatrix {
    /// Look up the matrix by its scenario name. Returns `None` for unknown
    /// names; the caller decides whether that warrants a warning or an error.
    pub fn from_name(name: &str) -> Option<CollisionMatrix> {
        match name {
            "aloha" => Some(CollisionMatrix::Aloha),
            "goursaud" => Some(CollisionMatrix::Goursaud),
            _ => None,
        }
    }

    /// Whether two overlapping transmissions with the given spreading factors
    /// destroy each other. Symmetric in its arguments.
    pub fn interferes(&self, a: SpreadingFactor, b: SpreadingFactor) -> bool {
        match self {
            CollisionMatrix::Aloha => true,
            CollisionMatrix::Goursaud => a == b,
        }
    }
}

impl std::fmt::Display for CollisionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollisionMatrix::Aloha => write!(f, "aloha"),
            CollisionMatrix::Goursaud => write!(f, "goursaud"),
        }
    }
}

/// Propagation model between radio positions.
#[derive(Debug, Clone)]
pub struct Channel {
    pub path_loss: PathLossParameters,
}

impl Channel {
    pub fn new(path_loss: PathLossParameters) -> Self {
        Channel { path_loss }
    }

    /// Path loss in dB between two positions (log-distance model, with
    /// shadowing sampled from `rng` when the parameters enable it).
    pub fn path_loss_db(&self, a: &Point3, b: &Point3, rng: &mut StdRng) -> f64 {
        signal_calculations::calculate_path_loss(a.distance(b), &self.path_loss, rng)
    }

    /// Propagation delay in seconds between two positions.
    pub fn propagation_delay_secs(&self, a: &Point3, b: &Point3) -> f64 {
        signal_calculations::propagation_delay_secs(a.distance(b))
    }
}

/// Decide the fate of a closing transmission against the set of in-flight
/// records at the same gateway.
///
/// `closing` is the record whose window just closed; `active` is the full
/// record set at that gateway (including `closing` itself and records whose
/// own windows already closed but still overlap open ones). The transmission
/// is received iff no overlapping record interferes with it under `matrix`.
pub fn resolve_outcome(
    closing: &TransmissionRecord,
    active: &[TransmissionRecord],
    matrix: CollisionMatrix,
) -> ReceptionOutcome {
    let mut interferers: Vec<PacketId> = Vec::new();
    for other in active {
        if other.packet_id == closing.packet_id {
            continue;
        }
        if closing.overlaps(other) && matrix.interferes(closing.spreading_factor, other.spreading_factor) {
            interferers.push(other.packet_id);
        }
    }
    if interferers.is_empty() {
        ReceptionOutcome::Received
    } else {
        ReceptionOutcome::Lost { interferers }
    }
}

/// Outcome of a reception attempt at a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceptionOutcome {
    Received,
    /// Destroyed by interference from the listed packets.
    Lost { interferers: Vec<PacketId> },
}
