//! Per-spreading-factor statistics collection.
//!
//! Components report radio events through the typed observer interfaces
//! below; the `StatisticsCollector` is the single owner of the counters and
//! is injected where reporting is needed. No ambient globals, no string-keyed
//! callback wiring.

use super::types::SpreadingFactor;

/// Observer of transmission starts at end devices.
pub trait TransmissionObserver {
    fn on_transmission_started(&mut self, spreading_factor: SpreadingFactor);
}

/// Observer of successful packet receptions at gateways.
pub trait ReceptionObserver {
    fn on_packet_received(&mut self, spreading_factor: SpreadingFactor);
}

/// Sent/received counters for one spreading-factor bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketCounters {
    pub sent: u64,
    pub received: u64,
}

/// Counters for all six buckets, index 0 = SF7 (fastest) .. 5 = SF12.
pub type StatisticsTable = [BucketCounters; 6];

/// Accumulates per-spreading-factor sent/received counters.
///
/// Pure accumulation: no derived computation beyond incrementing the matching
/// bucket. `snapshot` may be called at any time, including mid-run, without
/// disturbing the counters.
#[derive(Debug, Clone, Default)]
pub struct StatisticsCollector {
    table: StatisticsTable,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        StatisticsCollector::default()
    }

    /// Read-only copy of the current counters.
    pub fn snapshot(&self) -> StatisticsTable {
        self.table
    }

    pub fn total_sent(&self) -> u64 {
        self.table.iter().map(|b| b.sent).sum()
    }

    pub fn total_received(&self) -> u64 {
        self.table.iter().map(|b| b.received).sum()
    }
}

impl TransmissionObserver for StatisticsCollector {
    fn on_transmission_started(&mut self, spreading_factor: SpreadingFactor) {
        self.table[spreading_factor.bucket_index()].sent += 1;
    }
}

impl ReceptionObserver for StatisticsCollector {
    fn on_packet_received(&mut self, spreading_factor: SpreadingFactor) {
        self.table[spreading_factor.bucket_index()].received += 1;
    }
}
