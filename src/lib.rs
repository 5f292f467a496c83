//! Hierarchical map and status engine for solar streetlight telemetry.
//!
//! Readings are fetched through [`telemetry::QueryLayer`], resolved to
//! province / municipality / barangay with [`geo::resolver`], classified
//! with [`status::classifier`] and shown tier by tier through
//! [`map::MapController`]. [`dashboard::Dashboard`] wires them together.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod geo;
pub mod map;
pub mod report;
pub mod status;
pub mod telemetry;

pub use dashboard::{Dashboard, DeviceDetails, EventOutcome, MapEvent};
pub use error::{IdError, OverlayError, QueryError};
