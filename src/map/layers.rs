use crate::geo::hierarchy::LatLng;
use crate::map::controller::{MapSurface, Tier};
use crate::map::markers::MarkerSet;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Render tree kept in memory: which layer groups and overlays are
/// attached, where the view is, and any messages shown to the user.
#[derive(Debug, Default)]
pub struct LayerTree {
    layers: BTreeMap<Tier, MarkerSet>,
    overlays: BTreeMap<String, Value>,
    view: Option<(LatLng, f64)>,
    messages: Vec<String>,
    attach_counts: HashMap<Tier, usize>,
}

impl LayerTree {
    pub fn attached_tiers(&self) -> Vec<Tier> {
        self.layers.keys().copied().collect()
    }

    pub fn attached(&self, tier: Tier) -> Option<&MarkerSet> {
        self.layers.get(&tier)
    }

    pub fn overlays(&self) -> Vec<&str> {
        self.overlays.keys().map(String::as_str).collect()
    }

    pub fn view(&self) -> Option<(LatLng, f64)> {
        self.view
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn attach_count(&self, tier: Tier) -> usize {
        self.attach_counts.get(&tier).copied().unwrap_or(0)
    }
}

impl MapSurface for LayerTree {
    fn attach_layer(&mut self, markers: &MarkerSet) {
        debug!("Attaching {:?} layer with {} markers", markers.tier(), markers.len());
        *self.attach_counts.entry(markers.tier()).or_insert(0) += 1;
        self.layers.insert(markers.tier(), markers.clone());
    }

    fn detach_layer(&mut self, tier: Tier) {
        if self.layers.remove(&tier).is_some() {
            debug!("Detached {:?} layer", tier);
        }
    }

    fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.view = Some((center, zoom));
    }

    fn add_overlay(&mut self, region: &str, boundary: &Value) {
        self.overlays.insert(region.to_string(), boundary.clone());
    }

    fn remove_overlay(&mut self, region: &str) {
        self.overlays.remove(region);
    }

    fn show_message(&mut self, message: &str) {
        warn!("{}", message);
        self.messages.push(message.to_string());
    }
}
