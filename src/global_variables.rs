// Cadences (milliseconds)
pub const DEFAULT_CYCLE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;

// Signal timing, counted in decision cycles
pub const DEFAULT_PHASE_COUNT: usize = 2;
pub const DEFAULT_MIN_PHASE_CYCLES: u32 = 4;
pub const DEFAULT_MAX_PHASE_CYCLES: u32 = 15;
pub const DEFAULT_CLEARANCE_CYCLES: u32 = 2;

// Coordination rule
pub const DEFAULT_SWITCH_THRESHOLD: u32 = 10;
pub const DEFAULT_MAJORITY_FRACTION: f64 = 0.5;
pub const DEFAULT_DISCHARGE_RATE: u32 = 1;
pub const DEFAULT_APPROACH_CAPACITY: u32 = 20;

// Adaptive threshold
pub const DEFAULT_ADAPTIVE_WINDOW: u32 = 10;
pub const DEFAULT_ADAPTIVE_LOWER: u32 = 5;
pub const DEFAULT_ADAPTIVE_UPPER: u32 = 20;

// Random inflow profile
pub const DEFAULT_INFLOW_SEED: u64 = 42;
pub const DEFAULT_ARTERIAL_PROBABILITY: f64 = 0.50;
pub const DEFAULT_SIDE_PROBABILITY: f64 = 0.15;
pub const DEFAULT_MAX_BATCH: u32 = 3;

// Pending manual overrides buffered per agent
pub const OVERRIDE_QUEUE_CAPACITY: usize = 8;

// Grid layout used by the bundled example topology
pub const GRID_ORIGIN: f64 = 150.0;
pub const GRID_SPACING: f64 = 200.0;

// Congestion level: decay per cycle, load bands that deposit +1 / +2, ceiling
pub const CONGESTION_DECAY: f64 = 0.5;
pub const CONGESTION_BUSY_LOAD: u64 = 10;
pub const CONGESTION_HEAVY_LOAD: u64 = 15;
pub const CONGESTION_MAX: f64 = 10.0;

// Gridlock relief: a neighbor above this level, with our own phases below this queue
pub const GRIDLOCK_NEIGHBOR_CONGESTION: f64 = 8.0;
pub const GRIDLOCK_LOCAL_QUEUE: u64 = 4;
