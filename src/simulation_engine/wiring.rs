use crate::communication::messages::PhaseOverride;
use crate::communication::neighbor_channel::{link, NeighborEndpoint};
use crate::config::SignalConfig;
use crate::control_system::intersection_agent::IntersectionAgent;
use crate::global_variables::OVERRIDE_QUEUE_CAPACITY;
use crate::shared_data::Snapshot;
use crate::simulation_engine::topology::{NodeId, Topology};
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};

/// Every agent of a grid together with the handles the outside world keeps:
/// one override queue and one snapshot cell per node.
pub struct GridWiring {
    /// In topology order.
    pub agents: Vec<IntersectionAgent>,
    pub overrides: HashMap<NodeId, mpsc::Sender<PhaseOverride>>,
    /// In topology order.
    pub snapshot_cells: Vec<watch::Receiver<Snapshot>>,
}

/// Creates one link per edge and hands each agent its endpoints in the
/// order its neighbors were declared.
pub fn wire(topology: &Topology, signal: &SignalConfig) -> GridWiring {
    let mut endpoints: HashMap<NodeId, HashMap<NodeId, NeighborEndpoint>> = HashMap::new();
    for (a, b) in topology.edges() {
        let (a_end, b_end) = link(&a, &b);
        endpoints.entry(a.clone()).or_default().insert(b.clone(), a_end);
        endpoints.entry(b).or_default().insert(a, b_end);
    }

    let mut agents = Vec::with_capacity(topology.len());
    let mut overrides = HashMap::with_capacity(topology.len());
    let mut snapshot_cells = Vec::with_capacity(topology.len());

    for node in topology.nodes() {
        let mut own = endpoints.remove(&node.id).unwrap_or_default();
        let ordered: Vec<NeighborEndpoint> = node
            .neighbors
            .iter()
            .filter_map(|neighbor| own.remove(neighbor))
            .collect();

        let (override_tx, override_rx) = mpsc::channel(OVERRIDE_QUEUE_CAPACITY);
        let (agent, cell) = IntersectionAgent::new(node, topology, signal, ordered, override_rx);
        agents.push(agent);
        overrides.insert(node.id.clone(), override_tx);
        snapshot_cells.push(cell);
    }

    GridWiring {
        agents,
        overrides,
        snapshot_cells,
    }
}
