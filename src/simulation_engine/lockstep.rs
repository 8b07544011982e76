//! Deterministic single-threaded driver: every agent runs exactly one cycle
//! per `step`, in a caller-chosen order. Same agents and channels as the
//! concurrent runtime, minus the clock.

use crate::communication::messages::PhaseOverride;
use crate::config::SimulationConfig;
use crate::control_system::intersection_agent::{CycleReport, IntersectionAgent};
use crate::error::{ConfigError, SimulationError};
use crate::monitoring::snapshot_publisher::{SnapshotFeed, SnapshotPublisher};
use crate::shared_data::GridSnapshot;
use crate::simulation_engine::inflow::{inflow_model, InflowModel};
use crate::simulation_engine::topology::{NodeId, Topology};
use crate::simulation_engine::wiring::{wire, GridWiring};
use log::{debug, info};
use std::collections::HashMap;
use tokio::sync::mpsc;

struct LockstepNode {
    agent: IntersectionAgent,
    inflow: Box<dyn InflowModel>,
}

pub struct LockstepGrid {
    topology: Topology,
    phase_count: usize,
    /// In topology order; `None` once torn down.
    nodes: Vec<Option<LockstepNode>>,
    overrides: HashMap<NodeId, mpsc::Sender<PhaseOverride>>,
    publisher: SnapshotPublisher,
    steps: u64,
}

impl LockstepGrid {
    /// Validates `config` and wires the grid with the configured inflow.
    pub fn new(config: &SimulationConfig) -> Result<Self, ConfigError> {
        let topology = config.validate()?;
        let inflow = config.inflow.clone();
        Ok(Self::build(topology, config, |index, _| {
            inflow_model(&inflow, index)
        }))
    }

    /// Like `new`, but every node shares one inflow model factory.
    pub fn with_inflow<F>(config: &SimulationConfig, make_inflow: F) -> Result<Self, ConfigError>
    where
        F: FnMut(usize, &NodeId) -> Box<dyn InflowModel>,
    {
        let topology = config.validate()?;
        Ok(Self::build(topology, config, make_inflow))
    }

    fn build<F>(topology: Topology, config: &SimulationConfig, mut make_inflow: F) -> Self
    where
        F: FnMut(usize, &NodeId) -> Box<dyn InflowModel>,
    {
        let GridWiring {
            agents,
            overrides,
            snapshot_cells,
        } = wire(&topology, &config.signal);
        let nodes = agents
            .into_iter()
            .enumerate()
            .map(|(index, agent)| {
                let inflow = make_inflow(index, agent.id());
                Some(LockstepNode { agent, inflow })
            })
            .collect();
        let (publisher, _) = SnapshotPublisher::new(snapshot_cells);
        info!("lockstep grid ready with {} intersections", topology.len());

        Self {
            topology,
            phase_count: config.signal.phase_count,
            nodes,
            overrides,
            publisher,
            steps: 0,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Runs one cycle on every live agent in topology order.
    pub fn step(&mut self) -> Vec<CycleReport> {
        let order: Vec<usize> = (0..self.nodes.len()).collect();
        self.step_indices(&order)
    }

    /// Runs one cycle on the listed agents, in the listed order. Unknown or
    /// torn-down nodes are skipped.
    pub fn step_in_order(&mut self, order: &[NodeId]) -> Vec<CycleReport> {
        let indices: Vec<usize> = order
            .iter()
            .filter_map(|id| self.topology.index_of(id))
            .collect();
        self.step_indices(&indices)
    }

    fn step_indices(&mut self, indices: &[usize]) -> Vec<CycleReport> {
        self.steps += 1;
        let mut reports = Vec::with_capacity(indices.len());
        for &index in indices {
            if let Some(Some(node)) = self.nodes.get_mut(index) {
                reports.push(node.agent.run_cycle(node.inflow.as_mut()));
            }
        }
        debug!("lockstep step {} ran {} agents", self.steps, reports.len());
        reports
    }

    /// Runs a single agent's cycle.
    pub fn step_node(&mut self, id: &NodeId) -> Option<CycleReport> {
        let index = self.topology.index_of(id)?;
        let node = self.nodes.get_mut(index)?.as_mut()?;
        Some(node.agent.run_cycle(node.inflow.as_mut()))
    }

    pub fn agent(&self, id: &NodeId) -> Option<&IntersectionAgent> {
        let index = self.topology.index_of(id)?;
        self.nodes.get(index)?.as_ref().map(|node| &node.agent)
    }

    pub fn agent_mut(&mut self, id: &NodeId) -> Option<&mut IntersectionAgent> {
        let index = self.topology.index_of(id)?;
        self.nodes.get_mut(index)?.as_mut().map(|node| &mut node.agent)
    }

    /// Queues an override for the target's next decision step.
    pub fn request_override(&self, request: PhaseOverride) -> Result<(), SimulationError> {
        request.validate(&self.topology, self.phase_count)?;
        let node = request.node.clone();
        let sender = self
            .overrides
            .get(&node)
            .ok_or_else(|| SimulationError::AgentUnavailable(node.clone()))?;
        sender
            .try_send(request)
            .map_err(|_| SimulationError::AgentUnavailable(node))
    }

    /// Drops an agent and its link endpoints. Neighbors see the link go
    /// stale on their next read.
    pub fn tear_down(&mut self, id: &NodeId) -> bool {
        let Some(index) = self.topology.index_of(id) else {
            return false;
        };
        let removed = self.nodes.get_mut(index).and_then(Option::take).is_some();
        if removed {
            info!("{}: torn down", id);
        }
        removed
    }

    pub fn publish(&self) -> GridSnapshot {
        self.publisher.publish()
    }

    pub fn feed(&self) -> SnapshotFeed {
        self.publisher.subscribe()
    }
}
