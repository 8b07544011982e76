use crate::simulation_engine::topology::NodeId;
use crate::simulation_engine::traffic_state::PhaseId;
use thiserror::Error;

/// Problems found while loading or validating the start-up configuration.
/// All of them are fatal: the simulation does not launch.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("topology declares no nodes")]
    EmptyTopology,

    #[error("node {0} is declared more than once")]
    DuplicateNode(NodeId),

    #[error("node {0} lists itself as a neighbor")]
    SelfLoop(NodeId),

    #[error("node {node} lists neighbor {neighbor} more than once")]
    DuplicateNeighbor { node: NodeId, neighbor: NodeId },

    #[error("node {node} lists unknown neighbor {neighbor}")]
    UnknownNeighbor { node: NodeId, neighbor: NodeId },

    #[error("edge {from} -> {to} has no matching {to} -> {from}")]
    AsymmetricEdge { from: NodeId, to: NodeId },

    #[error("topology is not connected; unreachable from {root}: {unreachable:?}")]
    Disconnected {
        root: NodeId,
        unreachable: Vec<NodeId>,
    },

    #[error("invalid signal settings: {0}")]
    InvalidSignal(String),

    #[error("invalid timing settings: {0}")]
    InvalidTiming(String),

    #[error("invalid inflow settings: {0}")]
    InvalidInflow(String),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A manual override that cannot be applied. Nothing in the simulation changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidOverride {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {node} has no phase {phase} (phases 0..{phase_count})")]
    UnknownPhase {
        node: NodeId,
        phase: PhaseId,
        phase_count: usize,
    },
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("invalid override: {0}")]
    InvalidOverride(#[from] InvalidOverride),

    /// The agent task is gone or its override queue is full.
    #[error("agent {0} is not accepting requests")]
    AgentUnavailable(NodeId),

    /// These agents missed the shutdown grace period and were aborted.
    #[error("agents did not stop in time: {nodes:?}")]
    ShutdownTimeout { nodes: Vec<NodeId> },
}
