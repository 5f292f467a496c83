//! Viewport and layer-group state for the drill-down map.
//!
//! Exactly one tier's layer group is attached to the surface at any
//! time. Zoom changes pick the tier; selecting a marker flies the view
//! and supplies the child tier's markers explicitly.

use crate::error::OverlayError;
use crate::geo::hierarchy::{CoordinateHierarchy, LatLng};
use crate::map::markers::{MarkerAction, MarkerSet};
use crate::map::overlay::BoundarySource;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Province,
    Municipality,
    Barangay,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Province, Tier::Municipality, Tier::Barangay];

    fn index(self) -> usize {
        match self {
            Tier::Province => 0,
            Tier::Municipality => 1,
            Tier::Barangay => 2,
        }
    }
}

/// Zoom levels and the fallback centre used by the map.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// Zoom at load time; below `city_zoom`.
    pub province_zoom: f64,
    /// First zoom level showing municipalities.
    pub city_zoom: f64,
    /// First zoom level showing barangays.
    pub municipality_zoom: f64,
    pub default_lat: f64,
    pub default_lng: f64,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            province_zoom: 8.0,
            city_zoom: 10.0,
            municipality_zoom: 13.0,
            default_lat: 8.95,
            default_lng: 125.53,
        }
    }
}

impl MapSettings {
    pub fn tier_for(&self, zoom: f64) -> Tier {
        if zoom < self.city_zoom {
            Tier::Province
        } else if zoom < self.municipality_zoom {
            Tier::Municipality
        } else {
            Tier::Barangay
        }
    }

    pub fn fallback_center(&self) -> LatLng {
        LatLng {
            lat: self.default_lat,
            lng: self.default_lng,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.province_zoom < self.city_zoom && self.city_zoom < self.municipality_zoom
    }
}

/// The rendering side of the map.
pub trait MapSurface {
    fn attach_layer(&mut self, markers: &MarkerSet);
    /// Removes the tier's layer group from the render tree entirely.
    fn detach_layer(&mut self, tier: Tier);
    fn set_view(&mut self, center: LatLng, zoom: f64);
    fn add_overlay(&mut self, region: &str, boundary: &Value);
    fn remove_overlay(&mut self, region: &str);
    fn show_message(&mut self, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub zoom: f64,
    pub center: LatLng,
    pub visible_tier: Tier,
    pub active_overlays: BTreeSet<String>,
}

/// Issued when a drill-down starts; only the newest ticket may complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrillTicket {
    epoch: u64,
    tier: Tier,
}

impl DrillTicket {
    pub fn tier(&self) -> Tier {
        self.tier
    }
}

pub struct MapController {
    settings: MapSettings,
    viewport: ViewportState,
    layers: [MarkerSet; 3],
    attached: Option<Tier>,
    epoch: u64,
    boundaries: HashMap<String, Value>,
}

impl MapController {
    /// Starts at the province tier, centred on the eligible provinces.
    pub fn new(settings: MapSettings, hierarchy: &CoordinateHierarchy) -> Self {
        let center = hierarchy.centroid().unwrap_or_else(|| {
            warn!("No province has coordinates; using the default centre");
            settings.fallback_center()
        });
        let viewport = ViewportState {
            zoom: settings.province_zoom,
            center,
            visible_tier: Tier::Province,
            active_overlays: BTreeSet::new(),
        };
        MapController {
            settings,
            viewport,
            layers: Tier::ALL.map(MarkerSet::new),
            attached: None,
            epoch: 0,
            boundaries: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn markers(&self, tier: Tier) -> &MarkerSet {
        &self.layers[tier.index()]
    }

    pub fn attached_tier(&self) -> Option<Tier> {
        self.attached
    }

    /// Pushes the initial view and the visible tier to the surface.
    pub fn mount<S: MapSurface>(&mut self, surface: &mut S) {
        surface.set_view(self.viewport.center, self.viewport.zoom);
        self.show_tier(self.viewport.visible_tier, surface);
    }

    /// User zoom. Leaving the current tier supersedes any drill in flight.
    pub fn set_zoom<S: MapSurface>(&mut self, zoom: f64, surface: &mut S) {
        if self.settings.tier_for(zoom) != self.viewport.visible_tier {
            self.epoch += 1;
        }
        self.apply_zoom(zoom, surface);
    }

    fn apply_zoom<S: MapSurface>(&mut self, zoom: f64, surface: &mut S) {
        self.viewport.zoom = zoom;
        let tier = self.settings.tier_for(zoom);
        if tier != self.viewport.visible_tier || self.attached != Some(tier) {
            debug!("Zoom {} selects the {:?} tier", zoom, tier);
            self.show_tier(tier, surface);
        }
    }

    fn fly_to<S: MapSurface>(&mut self, center: LatLng, zoom: f64, surface: &mut S) {
        self.viewport.center = center;
        surface.set_view(center, zoom);
        self.apply_zoom(zoom, surface);
    }

    fn show_tier<S: MapSurface>(&mut self, tier: Tier, surface: &mut S) {
        for other in Tier::ALL {
            if other != tier {
                surface.detach_layer(other);
            }
        }
        if self.attached != Some(tier) {
            surface.attach_layer(&self.layers[tier.index()]);
        }
        self.attached = Some(tier);
        self.viewport.visible_tier = tier;
    }

    /// Swaps in a freshly built marker set, dropping the old one.
    pub fn replace_markers<S: MapSurface>(&mut self, markers: MarkerSet, surface: &mut S) {
        let tier = markers.tier();
        let is_attached = self.attached == Some(tier);
        if is_attached {
            surface.detach_layer(tier);
        }
        self.layers[tier.index()] = markers;
        if is_attached {
            surface.attach_layer(&self.layers[tier.index()]);
        }
    }

    /// Starts a drill into `tier`, superseding any drill in flight.
    pub fn begin_drill(&mut self, tier: Tier) -> DrillTicket {
        self.epoch += 1;
        DrillTicket {
            epoch: self.epoch,
            tier,
        }
    }

    pub fn is_current(&self, ticket: DrillTicket) -> bool {
        ticket.epoch == self.epoch
    }

    /// Flies to `center` at the ticket tier's zoom and shows `markers`.
    /// Returns false, changing nothing, if the ticket was superseded.
    pub fn complete_drill<S: MapSurface>(
        &mut self,
        ticket: DrillTicket,
        center: LatLng,
        markers: MarkerSet,
        surface: &mut S,
    ) -> bool {
        if !self.is_current(ticket) {
            info!("Discarding superseded {:?} drill-down", ticket.tier);
            return false;
        }
        let zoom = match ticket.tier {
            Tier::Province => self.settings.province_zoom,
            Tier::Municipality => self.settings.city_zoom,
            Tier::Barangay => self.settings.municipality_zoom,
        };
        self.replace_markers(markers, surface);
        self.fly_to(center, zoom, surface);
        true
    }

    /// The action a marker was built with, for wiring once its popup is
    /// on screen.
    pub fn marker_action(&self, marker_id: &str) -> Option<&MarkerAction> {
        self.layers
            .iter()
            .find_map(|set| set.find(marker_id))
            .map(|m| &m.action)
    }

    /// Adds or removes a region's boundary overlay, loading it on first
    /// use. Returns whether the overlay is now shown.
    pub async fn toggle_region<B, S>(
        &mut self,
        region: &str,
        source: &B,
        surface: &mut S,
    ) -> Result<bool, OverlayError>
    where
        B: BoundarySource,
        S: MapSurface,
    {
        if self.viewport.active_overlays.remove(region) {
            surface.remove_overlay(region);
            return Ok(false);
        }

        if !self.boundaries.contains_key(region) {
            match source.load(region).await {
                Ok(boundary) => {
                    self.boundaries.insert(region.to_string(), boundary);
                }
                Err(e) => {
                    surface.show_message(&format!("Could not load boundary for {}: {}", region, e));
                    return Err(e);
                }
            }
        }

        if let Some(boundary) = self.boundaries.get(region) {
            surface.add_overlay(region, boundary);
        }
        self.viewport.active_overlays.insert(region.to_string());
        Ok(true)
    }
}
