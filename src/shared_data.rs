// src/shared_data.rs

use crate::simulation_engine::topology::{NodeId, Position};
use crate::simulation_engine::traffic_state::PhaseId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Read-only copy of one intersection's state, produced at the end of a
/// decision cycle. Holds no reference to the live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub node: NodeId,
    pub position: Position,
    pub phase: PhaseId,
    /// Cycles spent in `phase` so far.
    pub elapsed: u32,
    pub in_clearance: bool,
    /// Pressure per approach, keyed by the neighbor it comes from.
    pub pressures: BTreeMap<NodeId, u32>,
    pub total_discharged: u64,
    /// Congestion level, `0.0..=10.0`.
    pub congestion: f64,
    /// Mean total pressure per cycle so far.
    pub average_queue: f64,
    /// Mean cycles a discharged unit spent queued.
    pub average_wait: f64,
    pub switch_threshold: u32,
    /// Cycle that produced the snapshot (0 before the first cycle).
    pub cycle: u64,
    pub timestamp_ms: u64,
}

impl Snapshot {
    pub fn total_pressure(&self) -> u64 {
        self.pressures.values().map(|&p| p as u64).sum()
    }
}

/// Latest snapshot of every intersection, ordered by node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub nodes: BTreeMap<NodeId, Snapshot>,
}

impl GridSnapshot {
    pub fn get(&self, node: &NodeId) -> Option<&Snapshot> {
        self.nodes.get(node)
    }

    pub fn phases(&self) -> BTreeMap<NodeId, PhaseId> {
        self.nodes
            .iter()
            .map(|(id, s)| (id.clone(), s.phase))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Milliseconds since the Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
