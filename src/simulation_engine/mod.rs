// simulation_engine/mod.rs
pub mod grid;
pub mod inflow;
pub mod lockstep;
pub mod simulation;
pub mod topology;
pub mod traffic_state;
pub mod wiring;
