//! Decentralized signal coordination for a grid of intersections.
//!
//! Every intersection runs as an autonomous agent that sees only its own
//! queues and the advisories of its adjacent neighbors. A publisher copies
//! each agent's latest snapshot into a grid-wide feed for observers.

pub mod communication;
pub mod config;
pub mod control_system;
pub mod error;
pub mod global_variables;
pub mod monitoring;
pub mod shared_data;
pub mod simulation_engine;

pub use communication::{Advisory, PhaseOverride};
pub use config::{ControlMode, InflowConfig, SignalConfig, SimulationConfig, TimingConfig};
pub use error::{ConfigError, InvalidOverride, SimulationError};
pub use shared_data::{GridSnapshot, Snapshot};
pub use simulation_engine::lockstep::LockstepGrid;
pub use simulation_engine::simulation::Simulation;
pub use simulation_engine::topology::{NodeId, NodeSpec, Topology};
pub use simulation_engine::traffic_state::PhaseId;
