pub mod decision;
pub mod intersection_agent;

pub use decision::{AdaptiveThreshold, NeighborView, SwitchPolicy, SwitchReason};
pub use intersection_agent::{CycleReport, IntersectionAgent};
