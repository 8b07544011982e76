use crate::error::InvalidOverride;
use crate::simulation_engine::topology::{NodeId, Topology};
use crate::simulation_engine::traffic_state::PhaseId;
use serde::{Deserialize, Serialize};

/// State advisory sent from one intersection to an adjacent one once per
/// decision cycle. Only the most recent advisory on a link matters, so the
/// traffic counters are running totals: an advisory that overwrites an
/// unread one still carries everything the lost one did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub from: NodeId,
    /// Sender's cycle counter when the advisory was produced.
    pub cycle: u64,
    /// Sender's queue pressure on its approach from the receiver.
    pub pressure: u32,
    /// Total traffic the sender has discharged towards the receiver.
    pub handover: u64,
    /// Total traffic from the receiver that the sender has admitted into
    /// its queue. The gap to the receiver's own `handover` is in flight.
    pub admitted: u64,
    /// Sender's congestion level, `0.0..=10.0`.
    pub congestion: f64,
    /// Green-wave request: the phase that serves the shared edge.
    pub requested_phase: Option<PhaseId>,
}

impl Advisory {
    /// Whether this advisory asks the receiver to leave `current`.
    pub fn requests_change_from(&self, current: PhaseId) -> bool {
        self.requested_phase.is_some_and(|p| p != current)
    }
}

/// Operator request to force `node` into `phase` at its next decision step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOverride {
    pub node: NodeId,
    pub phase: PhaseId,
}

impl PhaseOverride {
    pub fn new(node: impl Into<NodeId>, phase: usize) -> Self {
        Self {
            node: node.into(),
            phase: PhaseId(phase),
        }
    }

    /// Checks the target node exists and has the requested phase.
    pub fn validate(&self, topology: &Topology, phase_count: usize) -> Result<(), InvalidOverride> {
        if !topology.contains(&self.node) {
            return Err(InvalidOverride::UnknownNode(self.node.clone()));
        }
        if self.phase.0 >= phase_count {
            return Err(InvalidOverride::UnknownPhase {
                node: self.node.clone(),
                phase: self.phase,
                phase_count,
            });
        }
        Ok(())
    }
}
