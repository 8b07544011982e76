use crate::config::{AdaptiveThresholdConfig, ControlMode, SignalConfig};
use crate::global_variables::{GRIDLOCK_LOCAL_QUEUE, GRIDLOCK_NEIGHBOR_CONGESTION};
use crate::simulation_engine::traffic_state::{PhaseId, TrafficState};
use serde::{Deserialize, Serialize};

/// Why a node left its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchReason {
    /// The phase reached its maximum duration.
    MaxDuration,
    /// An unserved phase out-pressured the served one by the threshold.
    PressureThreshold,
    /// A majority of neighbors asked for a change.
    NeighborMajority,
    /// A neighbor is congested and this node is nearly empty.
    CongestionRelief,
    /// Operator override.
    ManualOverride,
}

/// What the latest advisories of reachable neighbors say.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NeighborView {
    /// Neighbors asking for a phase other than the current one.
    pub requests: usize,
    /// Every neighbor, reachable or not.
    pub count: usize,
    pub max_congestion: f64,
}

/// Phase switch rule for one intersection.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchPolicy {
    pub mode: ControlMode,
    pub threshold: u32,
    pub majority_fraction: f64,
}

impl SwitchPolicy {
    pub fn from_config(signal: &SignalConfig) -> Self {
        Self {
            mode: signal.mode,
            threshold: signal.switch_threshold,
            majority_fraction: signal.majority_fraction,
        }
    }

    /// Decides whether to leave the current phase.
    ///
    /// The maximum duration always forces a switch. Below the minimum or
    /// during clearance nothing else can. Equal pressures keep the current
    /// phase.
    pub fn evaluate(&self, state: &TrafficState, neighbors: &NeighborView) -> Option<SwitchReason> {
        if state.max_reached() {
            return Some(SwitchReason::MaxDuration);
        }
        if self.mode == ControlMode::FixedTime || !state.min_reached() || state.in_clearance() {
            return None;
        }

        if self.mode == ControlMode::Stigmergy
            && neighbors.max_congestion > GRIDLOCK_NEIGHBOR_CONGESTION
            && state.max_phase_pressure() < GRIDLOCK_LOCAL_QUEUE
        {
            return (state.phase() != PhaseId(0)).then_some(SwitchReason::CongestionRelief);
        }

        let served = state.served_pressure();
        let unserved = state.strongest_unserved();
        if unserved > served + self.threshold as u64 {
            return Some(SwitchReason::PressureThreshold);
        }

        if self.mode == ControlMode::Coordinated
            && neighbors.count > 0
            && neighbors.requests as f64 > self.majority_fraction * neighbors.count as f64
        {
            return Some(SwitchReason::NeighborMajority);
        }
        None
    }
}

/// Retunes the switch threshold from the average total pressure seen over
/// a window of cycles: heavy load raises it, light load lowers it.
#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    config: AdaptiveThresholdConfig,
    pressure_sum: u64,
    cycles: u32,
}

impl AdaptiveThreshold {
    pub fn new(config: AdaptiveThresholdConfig) -> Self {
        Self {
            config,
            pressure_sum: 0,
            cycles: 0,
        }
    }

    /// Feeds one cycle's total pressure. Returns the new threshold when a
    /// window closes.
    pub fn observe(&mut self, total_pressure: u64, threshold: u32) -> Option<u32> {
        self.pressure_sum += total_pressure;
        self.cycles += 1;
        if self.cycles < self.config.window {
            return None;
        }

        let average = self.pressure_sum as f64 / self.cycles as f64;
        self.pressure_sum = 0;
        self.cycles = 0;

        let adjusted = if average > 12.0 {
            threshold.saturating_add(2)
        } else if average > 8.0 {
            threshold.saturating_add(1)
        } else if average < 4.0 {
            threshold.saturating_sub(2)
        } else {
            threshold.saturating_sub(1)
        };
        Some(adjusted.clamp(self.config.lower, self.config.upper))
    }
}
