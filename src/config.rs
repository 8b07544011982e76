use crate::error::ConfigError;
use crate::global_variables::*;
use crate::simulation_engine::grid::grid_nodes;
use crate::simulation_engine::topology::{Topology, TopologyConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How an intersection decides when to leave its current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Switch every `max_phase_cycles`, ignoring pressure.
    FixedTime,
    /// Local pressure threshold only; neighbor requests are ignored.
    Actuated,
    /// Pressure threshold plus neighbor majority and green-wave requests.
    #[default]
    Coordinated,
    /// Pressure threshold plus congestion relief: a lightly loaded node next
    /// to a heavily congested neighbor heads back to phase 0 and holds it.
    Stigmergy,
}

/// Periodic retuning of the switch threshold from observed load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveThresholdConfig {
    /// Cycles averaged before each adjustment.
    pub window: u32,
    pub lower: u32,
    pub upper: u32,
}

impl Default for AdaptiveThresholdConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_ADAPTIVE_WINDOW,
            lower: DEFAULT_ADAPTIVE_LOWER,
            upper: DEFAULT_ADAPTIVE_UPPER,
        }
    }
}

/// Per-intersection signal parameters. Durations are in decision cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub phase_count: usize,
    pub min_phase_cycles: u32,
    pub max_phase_cycles: u32,
    /// Unserved pressure must exceed served pressure by more than this.
    pub switch_threshold: u32,
    /// Share of neighbors that must request a change (strictly more than).
    pub majority_fraction: f64,
    /// Pressure drained per served approach per cycle.
    pub discharge_rate: u32,
    /// Cycles after a switch during which nothing discharges.
    pub clearance_cycles: u32,
    pub approach_capacity: Option<u32>,
    pub mode: ControlMode,
    pub adaptive_threshold: Option<AdaptiveThresholdConfig>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            phase_count: DEFAULT_PHASE_COUNT,
            min_phase_cycles: DEFAULT_MIN_PHASE_CYCLES,
            max_phase_cycles: DEFAULT_MAX_PHASE_CYCLES,
            switch_threshold: DEFAULT_SWITCH_THRESHOLD,
            majority_fraction: DEFAULT_MAJORITY_FRACTION,
            discharge_rate: DEFAULT_DISCHARGE_RATE,
            clearance_cycles: DEFAULT_CLEARANCE_CYCLES,
            approach_capacity: Some(DEFAULT_APPROACH_CAPACITY),
            mode: ControlMode::default(),
            adaptive_threshold: None,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phase_count < 2 {
            return Err(ConfigError::InvalidSignal(format!(
                "phase_count must be at least 2, got {}",
                self.phase_count
            )));
        }
        if self.max_phase_cycles == 0 {
            return Err(ConfigError::InvalidSignal(
                "max_phase_cycles must be positive".to_string(),
            ));
        }
        if self.min_phase_cycles > self.max_phase_cycles {
            return Err(ConfigError::InvalidSignal(format!(
                "min_phase_cycles {} exceeds max_phase_cycles {}",
                self.min_phase_cycles, self.max_phase_cycles
            )));
        }
        if !(0.0..1.0).contains(&self.majority_fraction) {
            return Err(ConfigError::InvalidSignal(format!(
                "majority_fraction must be in [0, 1), got {}",
                self.majority_fraction
            )));
        }
        if self.discharge_rate == 0 {
            return Err(ConfigError::InvalidSignal(
                "discharge_rate must be positive".to_string(),
            ));
        }
        if self.approach_capacity == Some(0) {
            return Err(ConfigError::InvalidSignal(
                "approach_capacity must be positive".to_string(),
            ));
        }
        if let Some(adaptive) = &self.adaptive_threshold {
            if adaptive.window == 0 || adaptive.lower > adaptive.upper {
                return Err(ConfigError::InvalidSignal(format!(
                    "adaptive threshold window {} / bounds {}..={} are invalid",
                    adaptive.window, adaptive.lower, adaptive.upper
                )));
            }
        }
        Ok(())
    }
}

/// Wall-clock cadences. Every agent keeps its own clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub cycle_interval_ms: u64,
    pub publish_interval_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: DEFAULT_CYCLE_INTERVAL_MS,
            publish_interval_ms: DEFAULT_PUBLISH_INTERVAL_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl TimingConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_interval_ms == 0 || self.publish_interval_ms == 0 {
            return Err(ConfigError::InvalidTiming(
                "cycle and publish intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Source of new demand on each approach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InflowConfig {
    None,
    Constant {
        per_cycle: u32,
    },
    /// Each cycle an approach receives a batch of `1..=max_batch` with the
    /// given probability. Phase-0 approaches are treated as arterial.
    Random {
        seed: u64,
        arterial_probability: f64,
        side_probability: f64,
        max_batch: u32,
    },
}

impl Default for InflowConfig {
    fn default() -> Self {
        InflowConfig::Random {
            seed: DEFAULT_INFLOW_SEED,
            arterial_probability: DEFAULT_ARTERIAL_PROBABILITY,
            side_probability: DEFAULT_SIDE_PROBABILITY,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

impl InflowConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let InflowConfig::Random {
            arterial_probability,
            side_probability,
            max_batch,
            ..
        } = self
        {
            for p in [arterial_probability, side_probability] {
                if !(0.0..=1.0).contains(p) {
                    return Err(ConfigError::InvalidInflow(format!(
                        "probability {} is outside [0, 1]",
                        p
                    )));
                }
            }
            if *max_batch == 0 {
                return Err(ConfigError::InvalidInflow(
                    "max_batch must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// The whole start-up document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub timing: TimingConfig,
    pub signal: SignalConfig,
    pub inflow: InflowConfig,
    pub topology: TopologyConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            signal: SignalConfig::default(),
            inflow: InflowConfig::default(),
            topology: TopologyConfig {
                nodes: grid_nodes(3, 3),
            },
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks every section and builds the topology.
    pub fn validate(&self) -> Result<Topology, ConfigError> {
        self.timing.validate()?;
        self.signal.validate()?;
        self.inflow.validate()?;
        Topology::from_config(self.topology.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_to_three_by_three() {
        let config = SimulationConfig::default();
        let topology = config.validate().unwrap();
        assert_eq!(topology.len(), 9);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{
                "signal": {"min_phase_cycles": 2, "mode": "actuated"},
                "inflow": {"kind": "constant", "per_cycle": 1}
            }"#,
        )
        .unwrap();
        assert_eq!(config.signal.min_phase_cycles, 2);
        assert_eq!(config.signal.max_phase_cycles, DEFAULT_MAX_PHASE_CYCLES);
        assert_eq!(config.signal.mode, ControlMode::Actuated);
        assert_eq!(config.inflow, InflowConfig::Constant { per_cycle: 1 });
        assert_eq!(config.timing, TimingConfig::default());

        let config =
            SimulationConfig::from_json_str(r#"{"signal": {"mode": "stigmergy"}}"#).unwrap();
        assert_eq!(config.signal.mode, ControlMode::Stigmergy);
    }

    #[test]
    fn rejects_min_above_max() {
        let mut config = SimulationConfig::default();
        config.signal.min_phase_cycles = 20;
        config.signal.max_phase_cycles = 10;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSignal(_))
        ));
    }

    #[test]
    fn rejects_bad_cadence_and_probability() {
        let mut config = SimulationConfig::default();
        config.timing.cycle_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTiming(_))
        ));

        let mut config = SimulationConfig::default();
        config.inflow = InflowConfig::Random {
            seed: 1,
            arterial_probability: 1.5,
            side_probability: 0.1,
            max_batch: 3,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidInflow(_))
        ));
    }

    #[test]
    fn single_phase_is_rejected() {
        let mut config = SimulationConfig::default();
        config.signal.phase_count = 1;
        assert!(config.validate().is_err());
    }
}
