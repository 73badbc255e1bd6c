//! Mobility trace loading and playback.
//!
//! A trace is an ordered, finite sequence of `(node, time, position)`
//! waypoints, parsed once at setup and read-only afterwards. Installing a
//! trace applies time-zero waypoints immediately (they are the nodes' initial
//! positions, and must be in place before spreading factors are estimated)
//! and schedules one position-update event per later waypoint. Motion is an
//! instantaneous jump at each waypoint time.

pub mod trace_parser;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::simulation::network::Action;
use crate::simulation::scheduler::{Scheduler, SimTime};
use crate::simulation::types::{Node, NodeId};

pub use trace_parser::{TraceParseError, Waypoint};

/// Error raised when a trace references a node that does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownNodeError {
    pub node: NodeId,
    /// 1-based trace line that referenced the node.
    pub line: usize,
}

impl std::fmt::Display for UnknownNodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Trace line {} references unknown node {}", self.line, self.node)
    }
}

impl std::error::Error for UnknownNodeError {}

/// A parsed, validated mobility trace.
#[derive(Debug, Clone, Default)]
pub struct MobilityTrace {
    waypoints: Vec<Waypoint>,
}

impl MobilityTrace {
    /// Read and parse a trace file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path).with_context(|| format!("Failed to read trace file: {}", path.display()))?;
        let trace = MobilityTrace::parse(&data)?;
        Ok(trace)
    }

    /// Parse trace text. Waypoint times must be non-decreasing per node.
    pub fn parse(text: &str) -> Result<Self, TraceParseError> {
        let mut waypoints = Vec::new();
        let mut last_time: HashMap<NodeId, f64> = HashMap::new();

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let Some(waypoint) = trace_parser::parse_line(line, line_number)? else {
                continue;
            };
            if let Some(&previous) = last_time.get(&waypoint.node) {
                if waypoint.time_secs < previous {
                    return Err(TraceParseError {
                        line: line_number,
                        reason: format!(
                            "waypoint time {} for node {} is earlier than previous waypoint at {}",
                            waypoint.time_secs, waypoint.node, previous
                        ),
                    });
                }
            }
            last_time.insert(waypoint.node, waypoint.time_secs);
            waypoints.push(waypoint);
        }

        Ok(MobilityTrace { waypoints })
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Install the trace: every waypoint must reference an existing node.
    /// Time-zero waypoints set positions immediately; later ones are
    /// scheduled as position-update events at their absolute times. An empty
    /// trace leaves every position at its construction-time default.
    pub fn install(&self, nodes: &mut BTreeMap<NodeId, Node>, scheduler: &mut Scheduler<Action>) -> anyhow::Result<()> {
        for waypoint in &self.waypoints {
            let Some(node) = nodes.get_mut(&waypoint.node) else {
                return Err(UnknownNodeError {
                    node: waypoint.node,
                    line: waypoint.line,
                }
                .into());
            };
            if waypoint.time_secs == 0.0 {
                node.set_position(waypoint.position);
            } else {
                scheduler
                    .schedule_at(
                        SimTime::from_secs_f64(waypoint.time_secs),
                        Action::PositionUpdate {
                            node: waypoint.node,
                            position: waypoint.position,
                        },
                    )
                    .context("Failed to schedule mobility waypoint")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::Point3;

    fn node_set(ids: &[NodeId]) -> BTreeMap<NodeId, Node> {
        ids.iter().map(|&id| (id, Node::end_device(id, Point3::default()))).collect()
    }

    #[test]
    fn parses_multiple_nodes_and_keeps_order() {
        let trace = MobilityTrace::parse("0 0 1 1 0\n1 5 2 2 0\n0 10 3 3 0\n").unwrap();
        assert_eq!(trace.waypoints().len(), 3);
        assert_eq!(trace.waypoints()[2].node, 0);
        assert_eq!(trace.waypoints()[2].time_secs, 10.0);
    }

    #[test]
    fn rejects_time_going_backwards_for_a_node() {
        let err = MobilityTrace::parse("0 10 1 1 0\n0 5 2 2 0\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.reason.contains("earlier than previous"));
    }

    #[test]
    fn interleaved_nodes_may_have_independent_clocks() {
        // Per-node monotonicity only; global interleaving is fine.
        assert!(MobilityTrace::parse("0 10 1 1 0\n1 5 2 2 0\n0 20 3 3 0\n").is_ok());
    }

    #[test]
    fn install_rejects_unknown_nodes() {
        let trace = MobilityTrace::parse("7 5 1 1 0\n").unwrap();
        let mut nodes = node_set(&[0, 1]);
        let mut scheduler = Scheduler::new();
        let err = trace.install(&mut nodes, &mut scheduler).unwrap_err();
        let unknown = err.downcast_ref::<UnknownNodeError>().unwrap();
        assert_eq!(unknown.node, 7);
        assert_eq!(unknown.line, 1);
    }

    #[test]
    fn install_applies_time_zero_immediately_and_schedules_the_rest() {
        let trace = MobilityTrace::parse("0 0 9 9 0\n0 5 1 1 0\n").unwrap();
        let mut nodes = node_set(&[0]);
        let mut scheduler = Scheduler::new();
        trace.install(&mut nodes, &mut scheduler).unwrap();

        assert_eq!(nodes[&0].position().unwrap(), Point3::new(9.0, 9.0, 0.0));
        assert_eq!(scheduler.pending_events(), 1);
        let (time, action) = scheduler.pop_due(SimTime::from_secs(100)).unwrap();
        assert_eq!(time, SimTime::from_secs(5));
        assert!(matches!(action, Action::PositionUpdate { node: 0, .. }));
    }

    #[test]
    fn empty_trace_installs_nothing() {
        let trace = MobilityTrace::parse("# only comments\n\n").unwrap();
        assert!(trace.is_empty());
        let mut nodes = node_set(&[0]);
        let mut scheduler = Scheduler::new();
        trace.install(&mut nodes, &mut scheduler).unwrap();
        assert_eq!(nodes[&0].position().unwrap(), Point3::default());
        assert_eq!(scheduler.pending_events(), 0);
    }
}
