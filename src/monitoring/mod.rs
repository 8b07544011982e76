pub mod console;
pub mod recorder;
pub mod snapshot_publisher;

pub use snapshot_publisher::{SnapshotFeed, SnapshotPublisher};
