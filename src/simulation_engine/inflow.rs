use crate::config::InflowConfig;
use crate::simulation_engine::topology::NodeId;
use crate::simulation_engine::traffic_state::PhaseId;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Source of new demand. Asked once per approach per decision cycle.
pub trait InflowModel: Send {
    fn inflow(&mut self, node: &NodeId, approach: &NodeId, phase: PhaseId) -> u32;
}

/// No external demand; only neighbor handovers add pressure.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInflow;

impl InflowModel for NoInflow {
    fn inflow(&mut self, _node: &NodeId, _approach: &NodeId, _phase: PhaseId) -> u32 {
        0
    }
}

/// The same amount on every approach every cycle.
#[derive(Debug, Clone, Copy)]
pub struct ConstantInflow {
    pub per_cycle: u32,
}

impl InflowModel for ConstantInflow {
    fn inflow(&mut self, _node: &NodeId, _approach: &NodeId, _phase: PhaseId) -> u32 {
        self.per_cycle
    }
}

/// Fixed per-approach amounts, keyed by `(node, approach)`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInflow {
    amounts: HashMap<(NodeId, NodeId), u32>,
}

impl ScriptedInflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, node: impl Into<NodeId>, approach: impl Into<NodeId>, per_cycle: u32) -> Self {
        self.amounts.insert((node.into(), approach.into()), per_cycle);
        self
    }
}

impl InflowModel for ScriptedInflow {
    fn inflow(&mut self, node: &NodeId, approach: &NodeId, _phase: PhaseId) -> u32 {
        self.amounts
            .get(&(node.clone(), approach.clone()))
            .copied()
            .unwrap_or(0)
    }
}

/// Bernoulli arrivals in batches of `1..=max_batch`. Phase-0 approaches
/// carry the arterial rate, every other approach the side-street rate.
#[derive(Debug, Clone)]
pub struct RandomInflow {
    rng: SmallRng,
    arterial_probability: f64,
    side_probability: f64,
    max_batch: u32,
}

impl RandomInflow {
    pub fn new(seed: u64, arterial_probability: f64, side_probability: f64, max_batch: u32) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            arterial_probability: arterial_probability.clamp(0.0, 1.0),
            side_probability: side_probability.clamp(0.0, 1.0),
            max_batch: max_batch.max(1),
        }
    }
}

impl InflowModel for RandomInflow {
    fn inflow(&mut self, _node: &NodeId, _approach: &NodeId, phase: PhaseId) -> u32 {
        let probability = if phase == PhaseId(0) {
            self.arterial_probability
        } else {
            self.side_probability
        };
        if self.rng.random_bool(probability) {
            self.rng.random_range(1..=self.max_batch)
        } else {
            0
        }
    }
}

/// Builds the inflow model for the node at `node_index`. Random inflow gets
/// a per-node seed so runs are reproducible and nodes are independent.
pub fn inflow_model(config: &InflowConfig, node_index: usize) -> Box<dyn InflowModel> {
    match config {
        InflowConfig::None => Box::new(NoInflow),
        InflowConfig::Constant { per_cycle } => Box::new(ConstantInflow {
            per_cycle: *per_cycle,
        }),
        InflowConfig::Random {
            seed,
            arterial_probability,
            side_probability,
            max_batch,
        } => Box::new(RandomInflow::new(
            seed.wrapping_add(node_index as u64),
            *arterial_probability,
            *side_probability,
            *max_batch,
        )),
    }
}
