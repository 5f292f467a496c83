pub mod hierarchy;
pub mod resolver;

pub use hierarchy::{Barangay, CoordinateHierarchy, LatLng, Municipality, Province};
pub use resolver::{locate, parse, DeviceId, Location, UNKNOWN_LOCATION};
