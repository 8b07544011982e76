use crate::config::SignalConfig;
use crate::global_variables::{
    CONGESTION_BUSY_LOAD, CONGESTION_DECAY, CONGESTION_HEAVY_LOAD, CONGESTION_MAX,
};
use crate::simulation_engine::topology::{NodeId, NodeSpec, Position, Topology};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Index of a signal phase in the node's cyclic phase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseId(pub usize);

impl PhaseId {
    /// The phase after this one in the ring `0 -> 1 -> .. -> count-1 -> 0`.
    pub fn next(self, phase_count: usize) -> PhaseId {
        PhaseId((self.0 + 1) % phase_count)
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phase serving the approach that arrives at `at` from `from`.
///
/// The bearing is measured from the vertical axis and folded so that
/// opposite approaches share a phase, then split into `phase_count` equal
/// sectors. With two phases, phase 0 is north/south and phase 1 east/west.
pub fn approach_phase(at: Position, from: Position, phase_count: usize) -> PhaseId {
    let dx = from.x - at.x;
    let dy = from.y - at.y;
    let theta = dx.atan2(dy).to_degrees().rem_euclid(180.0);
    let width = 180.0 / phase_count as f64;
    let sector = ((theta + width / 2.0) / width).floor() as usize;
    PhaseId(sector % phase_count)
}

/// Neighbor that traffic arriving from `from` continues towards: the one
/// roughly opposite it. `None` means the traffic leaves the grid.
fn downstream_of(at: &NodeSpec, from: &NodeId, topology: &Topology) -> Option<NodeId> {
    let origin = at.position();
    let unit = |id: &NodeId| {
        let p = topology.node(id)?.position();
        let (dx, dy) = (p.x - origin.x, p.y - origin.y);
        let len = dx.hypot(dy);
        (len > 0.0).then(|| (dx / len, dy / len))
    };
    let incoming = unit(from)?;

    at.neighbors
        .iter()
        .filter(|id| *id != from)
        .filter_map(|id| unit(id).map(|dir| (id, incoming.0 * dir.0 + incoming.1 * dir.1)))
        .filter(|(_, cos)| *cos < -0.7)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id.clone())
}

/// One incoming direction, keyed by the neighbor it comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approach {
    pub phase: PhaseId,
    pub pressure: u32,
    pub downstream: Option<NodeId>,
}

/// Traffic discharged from one approach during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discharge {
    pub approach: NodeId,
    pub downstream: Option<NodeId>,
    pub amount: u32,
}

/// Queue pressure per approach plus the signal's phase clock for one node.
/// Owned and mutated only by that node's agent.
#[derive(Debug, Clone)]
pub struct TrafficState {
    approaches: BTreeMap<NodeId, Approach>,
    phase: PhaseId,
    phase_count: usize,
    elapsed: u32,
    min_phase: u32,
    max_phase: u32,
    clearance_cycles: u32,
    clearance_remaining: u32,
    discharge_rate: u32,
    capacity: Option<u32>,
    total_discharged: u64,
    congestion: f64,
    queue_sum: u64,
    cycles_observed: u64,
}

impl TrafficState {
    /// Starts in phase 0 with zero pressure everywhere.
    pub fn new(node: &NodeSpec, topology: &Topology, signal: &SignalConfig) -> Self {
        let approaches = node
            .neighbors
            .iter()
            .filter_map(|neighbor| {
                let from = topology.node(neighbor)?.position();
                Some((
                    neighbor.clone(),
                    Approach {
                        phase: approach_phase(node.position(), from, signal.phase_count),
                        pressure: 0,
                        downstream: downstream_of(node, neighbor, topology),
                    },
                ))
            })
            .collect();

        Self {
            approaches,
            phase: PhaseId(0),
            phase_count: signal.phase_count,
            elapsed: 0,
            min_phase: signal.min_phase_cycles,
            max_phase: signal.max_phase_cycles,
            clearance_cycles: signal.clearance_cycles,
            clearance_remaining: 0,
            discharge_rate: signal.discharge_rate,
            capacity: signal.approach_capacity,
            total_discharged: 0,
            congestion: 0.0,
            queue_sum: 0,
            cycles_observed: 0,
        }
    }

    pub fn phase(&self) -> PhaseId {
        self.phase
    }

    pub fn phase_count(&self) -> usize {
        self.phase_count
    }

    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    pub fn min_phase(&self) -> u32 {
        self.min_phase
    }

    pub fn max_phase(&self) -> u32 {
        self.max_phase
    }

    pub fn in_clearance(&self) -> bool {
        self.clearance_remaining > 0
    }

    pub fn capacity(&self) -> Option<u32> {
        self.capacity
    }

    pub fn total_discharged(&self) -> u64 {
        self.total_discharged
    }

    /// Congestion level left behind by recent load, `0.0..=CONGESTION_MAX`.
    pub fn congestion(&self) -> f64 {
        self.congestion
    }

    /// Mean total pressure over the cycles observed so far.
    pub fn average_queue(&self) -> f64 {
        if self.cycles_observed == 0 {
            return 0.0;
        }
        self.queue_sum as f64 / self.cycles_observed as f64
    }

    /// Mean cycles a discharged unit spent queued: every queued unit waits
    /// one cycle per observation.
    pub fn average_wait(&self) -> f64 {
        if self.total_discharged == 0 {
            return 0.0;
        }
        self.queue_sum as f64 / self.total_discharged as f64
    }

    pub fn approaches(&self) -> impl Iterator<Item = (&NodeId, &Approach)> {
        self.approaches.iter()
    }

    pub fn pressure(&self, approach: &NodeId) -> Option<u32> {
        self.approaches.get(approach).map(|a| a.pressure)
    }

    pub fn pressures(&self) -> BTreeMap<NodeId, u32> {
        self.approaches
            .iter()
            .map(|(id, a)| (id.clone(), a.pressure))
            .collect()
    }

    pub fn total_pressure(&self) -> u64 {
        self.approaches.values().map(|a| a.pressure as u64).sum()
    }

    pub fn phase_of(&self, approach: &NodeId) -> Option<PhaseId> {
        self.approaches.get(approach).map(|a| a.phase)
    }

    pub fn is_served(&self, approach: &NodeId) -> bool {
        self.phase_of(approach) == Some(self.phase)
    }

    pub fn phase_pressure(&self, phase: PhaseId) -> u64 {
        self.approaches
            .values()
            .filter(|a| a.phase == phase)
            .map(|a| a.pressure as u64)
            .sum()
    }

    pub fn served_pressure(&self) -> u64 {
        self.phase_pressure(self.phase)
    }

    /// Highest aggregate pressure of any single phase.
    pub fn max_phase_pressure(&self) -> u64 {
        (0..self.phase_count)
            .map(|p| self.phase_pressure(PhaseId(p)))
            .max()
            .unwrap_or(0)
    }

    /// Highest aggregate pressure among the phases not currently active.
    pub fn strongest_unserved(&self) -> u64 {
        (0..self.phase_count)
            .map(PhaseId)
            .filter(|p| *p != self.phase)
            .map(|p| self.phase_pressure(p))
            .max()
            .unwrap_or(0)
    }

    /// Adds demand to an approach, refusing whatever would overflow the
    /// approach capacity. Returns the amount accepted.
    pub fn add_inflow(&mut self, approach: &NodeId, amount: u32) -> u32 {
        let capacity = self.capacity;
        let Some(a) = self.approaches.get_mut(approach) else {
            return 0;
        };
        let room = capacity.map_or(u32::MAX, |c| c.saturating_sub(a.pressure));
        let accepted = amount.min(room);
        a.pressure = a.pressure.saturating_add(accepted);
        accepted
    }

    /// Overwrites an approach's pressure (clamped to capacity).
    pub fn set_pressure(&mut self, approach: &NodeId, pressure: u32) -> bool {
        let capacity = self.capacity;
        match self.approaches.get_mut(approach) {
            Some(a) => {
                a.pressure = capacity.map_or(pressure, |c| pressure.min(c));
                true
            }
            None => false,
        }
    }

    /// Drains the served approaches. Nothing moves during clearance.
    /// `room` reports how much a downstream neighbor can still take (`None`
    /// for no limit); an approach only moves what fits and holds the rest.
    pub fn discharge(
        &mut self,
        mut room: impl FnMut(&NodeId) -> Option<u32>,
    ) -> Vec<Discharge> {
        if self.clearance_remaining > 0 {
            self.clearance_remaining -= 1;
            return Vec::new();
        }

        let mut moved = Vec::new();
        for (id, a) in self.approaches.iter_mut() {
            if a.phase != self.phase || a.pressure == 0 {
                continue;
            }
            let limit = a.downstream.as_ref().and_then(&mut room);
            let amount = a
                .pressure
                .min(self.discharge_rate)
                .min(limit.unwrap_or(u32::MAX));
            if amount == 0 {
                continue;
            }
            a.pressure -= amount;
            self.total_discharged += amount as u64;
            moved.push(Discharge {
                approach: id.clone(),
                downstream: a.downstream.clone(),
                amount,
            });
        }
        moved
    }

    /// End-of-cycle bookkeeping: decays the congestion level, deposits more
    /// under load, and adds the current queue to the running averages.
    pub fn observe_load(&mut self) {
        let total = self.total_pressure();
        self.queue_sum += total;
        self.cycles_observed += 1;

        let deposit = if total > CONGESTION_HEAVY_LOAD {
            2.0
        } else if total > CONGESTION_BUSY_LOAD {
            1.0
        } else {
            0.0
        };
        let decayed = if self.congestion > 0.0 {
            self.congestion - CONGESTION_DECAY
        } else {
            0.0
        };
        self.congestion = (decayed + deposit).clamp(0.0, CONGESTION_MAX);
    }

    /// One more cycle spent in the current phase.
    pub fn advance_elapsed(&mut self) {
        self.elapsed = self.elapsed.saturating_add(1);
    }

    pub fn min_reached(&self) -> bool {
        self.elapsed >= self.min_phase
    }

    pub fn max_reached(&self) -> bool {
        self.elapsed >= self.max_phase
    }

    /// Moves to the next phase in the ring and restarts the phase clock.
    pub fn switch_to_next(&mut self) -> PhaseId {
        self.phase = self.phase.next(self.phase_count);
        self.elapsed = 0;
        self.clearance_remaining = self.clearance_cycles;
        self.phase
    }

    /// Jumps straight to `phase`. Out-of-range phases are ignored.
    pub fn force_phase(&mut self, phase: PhaseId) -> bool {
        if phase.0 >= self.phase_count {
            return false;
        }
        if phase != self.phase {
            self.clearance_remaining = self.clearance_cycles;
        }
        self.phase = phase;
        self.elapsed = 0;
        true
    }
}
