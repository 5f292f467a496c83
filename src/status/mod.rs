pub mod classifier;
pub mod stats;

pub use classifier::{classify, Status, StatusThresholds};
pub use stats::{fleet_stats, latest_per_device, FleetStats, LatestReading};
