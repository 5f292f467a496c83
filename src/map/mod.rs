pub mod controller;
pub mod layers;
pub mod markers;
pub mod overlay;

pub use controller::{DrillTicket, MapController, MapSettings, MapSurface, Tier, ViewportState};
pub use layers::LayerTree;
pub use markers::{Marker, MarkerAction, MarkerContext, MarkerSet};
pub use overlay::{BoundarySource, FsBoundaries, MemoryBoundaries};
