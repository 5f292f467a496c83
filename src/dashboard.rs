//! Session wiring: fetches data through the query layer, resolves it
//! against the coordinate hierarchy and drives the map controller.
//!
//! Every fetch failure is shown on the surface and degrades the affected
//! tier to an empty marker set; nothing here aborts the session.

use crate::error::{OverlayError, QueryError};
use crate::geo::resolver::{self, Location};
pub use crate::geo::resolver::UNKNOWN_LOCATION;
use crate::geo::{CoordinateHierarchy, LatLng};
use crate::map::markers::{self, MarkerAction, MarkerContext, MarkerSet};
use crate::map::{BoundarySource, DrillTicket, MapController, MapSettings, MapSurface, Tier};
use crate::report::{self, StatusRecord};
use crate::status::{self, FleetStats, Status, StatusThresholds};
use crate::telemetry::{Endpoint, QueryLayer, Reading};
use chrono::NaiveDateTime;
use tracing::{info, warn};

/// Input from the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    ZoomChanged(f64),
    MarkerClicked(String),
    /// A marker's popup is attached and its controls can be wired.
    PopupMounted(String),
    RegionToggled(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Idle,
    Zoomed(Tier),
    Drilled { tier: Tier, markers: usize },
    Devices(Vec<DeviceRow>),
    PopupBound(MarkerAction),
    Overlay { region: String, shown: bool },
    Failed(String),
}

/// A device in a barangay listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRow {
    pub id: String,
    pub status: Status,
    pub reading: Reading,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDetails {
    pub id: String,
    pub location: Option<Location>,
    /// Oldest first.
    pub history: Vec<Reading>,
    pub status: Option<Status>,
}

impl DeviceDetails {
    pub fn location_label(&self) -> String {
        match &self.location {
            Some(l) => format!("{}, {}, {}", l.barangay, l.municipality, l.province),
            None => UNKNOWN_LOCATION.to_string(),
        }
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.history.last()
    }
}

pub struct Dashboard<E, B, S> {
    query: QueryLayer<E>,
    boundaries: B,
    surface: S,
    hierarchy: CoordinateHierarchy,
    controller: MapController,
    thresholds: StatusThresholds,
    readings: Vec<Reading>,
    clock: Box<dyn Fn() -> NaiveDateTime>,
}

impl<E, B, S> Dashboard<E, B, S>
where
    E: Endpoint,
    B: BoundarySource,
    S: MapSurface,
{
    pub fn new(
        query: QueryLayer<E>,
        boundaries: B,
        surface: S,
        hierarchy: CoordinateHierarchy,
        settings: MapSettings,
        thresholds: StatusThresholds,
    ) -> Self {
        let controller = MapController::new(settings, &hierarchy);
        Dashboard {
            query,
            boundaries,
            surface,
            hierarchy,
            controller,
            thresholds,
            readings: Vec::new(),
            clock: Box::new(|| chrono::Local::now().naive_local()),
        }
    }

    /// Replaces the wall clock used for classification.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn controller(&self) -> &MapController {
        &self.controller
    }

    pub fn hierarchy(&self) -> &CoordinateHierarchy {
        &self.hierarchy
    }

    pub fn query(&self) -> &QueryLayer<E> {
        &self.query
    }

    /// The last full dataset fetched.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    fn marker_context<'a>(&'a self, readings: &'a [Reading]) -> MarkerContext<'a> {
        MarkerContext {
            hierarchy: &self.hierarchy,
            readings,
            now: self.now(),
            thresholds: &self.thresholds,
        }
    }

    /// Fetches the full dataset and shows the province tier.
    pub async fn load(&mut self) -> Result<(), QueryError> {
        let outcome = match self.query.all_readings().await {
            Ok(readings) => {
                info!("Loaded {} readings", readings.len());
                self.readings = readings;
                Ok(())
            }
            Err(e) => {
                self.surface
                    .show_message(&format!("Could not load streetlight data: {}", e));
                self.readings.clear();
                Err(e)
            }
        };

        let markers = if outcome.is_ok() {
            markers::build_province_markers(&self.marker_context(&self.readings))
        } else {
            MarkerSet::new(Tier::Province)
        };
        self.controller.replace_markers(markers, &mut self.surface);
        if self.controller.attached_tier().is_none() {
            self.controller.mount(&mut self.surface);
        }
        outcome
    }

    pub fn set_zoom(&mut self, zoom: f64) -> Tier {
        self.controller.set_zoom(zoom, &mut self.surface);
        self.controller.viewport().visible_tier
    }

    fn fail_drill(&mut self, ticket: DrillTicket, center: LatLng, err: &QueryError) {
        if !self.controller.is_current(ticket) {
            return;
        }
        self.surface.show_message(&format!("Could not load markers: {}", err));
        self.controller
            .complete_drill(ticket, center, MarkerSet::new(ticket.tier()), &mut self.surface);
    }

    /// Flies to a province and shows its municipalities. Returns false if
    /// the province is unknown or the drill was superseded.
    pub async fn select_province(&mut self, province: &str) -> Result<bool, QueryError> {
        let Some(center) = self.hierarchy.province(province).and_then(|p| p.position()) else {
            warn!("Province {} is not on the map", province);
            return Ok(false);
        };

        let ticket = self.controller.begin_drill(Tier::Municipality);
        let readings = match self.query.all_readings().await {
            Ok(readings) => readings,
            Err(e) => {
                self.fail_drill(ticket, center, &e);
                return Err(e);
            }
        };

        let markers = markers::build_municipality_markers(&self.marker_context(&readings), province);
        self.readings = readings;
        Ok(self
            .controller
            .complete_drill(ticket, center, markers, &mut self.surface))
    }

    /// Flies to a municipality and shows its barangays, using the
    /// municipality-scoped dataset.
    pub async fn select_municipality(
        &mut self,
        province: &str,
        municipality: &str,
    ) -> Result<bool, QueryError> {
        let Some(unit) = self
            .hierarchy
            .province(province)
            .and_then(|p| p.municipality(municipality))
        else {
            warn!("Municipality {} / {} is not on the map", province, municipality);
            return Ok(false);
        };
        let Some(center) = unit.position() else {
            warn!("Municipality {} has no coordinates", municipality);
            return Ok(false);
        };
        let code = unit.municipality_code.clone();

        let ticket = self.controller.begin_drill(Tier::Barangay);
        let readings = match self.query.municipality_readings(&code).await {
            Ok(readings) => readings,
            Err(e) => {
                self.fail_drill(ticket, center, &e);
                return Err(e);
            }
        };

        let markers = markers::build_barangay_markers(
            &self.marker_context(&readings),
            province,
            municipality,
        );
        Ok(self
            .controller
            .complete_drill(ticket, center, markers, &mut self.surface))
    }

    /// The devices of one barangay with their current status.
    pub async fn barangay_devices(
        &mut self,
        province: &str,
        municipality: &str,
        barangay: &str,
    ) -> Result<Vec<DeviceRow>, QueryError> {
        let Some(parent) = self
            .hierarchy
            .province(province)
            .and_then(|p| p.municipality(municipality))
        else {
            warn!("Municipality {} / {} is not on the map", province, municipality);
            return Ok(Vec::new());
        };
        let Some(unit) = parent.barangay(barangay) else {
            warn!("Barangay {} is not on the map", barangay);
            return Ok(Vec::new());
        };
        let (municipality_code, barangay_code) =
            (parent.municipality_code.clone(), unit.barangay_code.clone());

        let readings = match self
            .query
            .barangay_readings(&municipality_code, &barangay_code)
            .await
        {
            Ok(readings) => readings,
            Err(e) => {
                self.surface
                    .show_message(&format!("Could not load devices for {}: {}", barangay, e));
                return Err(e);
            }
        };

        let now = self.now();
        Ok(status::latest_per_device(&readings)
            .into_iter()
            .map(|latest| DeviceRow {
                id: latest.reading.id.clone(),
                status: self.thresholds.classify(latest.reading, now),
                reading: latest.reading.clone(),
            })
            .collect())
    }

    /// History, location and current status of one device.
    pub async fn device_details(&self, id: &str) -> Result<DeviceDetails, QueryError> {
        let history = self.query.device_details(id).await?;
        let now = self.now();
        let status = history.last().map(|r| self.thresholds.classify(r, now));
        Ok(DeviceDetails {
            id: id.to_string(),
            location: resolver::locate(id, &self.hierarchy),
            history,
            status,
        })
    }

    pub async fn count(&self, pattern: &str) -> Result<u64, QueryError> {
        self.query.count(pattern).await
    }

    pub fn locate(&self, id: &str) -> Option<Location> {
        resolver::locate(id, &self.hierarchy)
    }

    /// Totals over the latest reading of every device.
    pub fn fleet_stats(&self) -> FleetStats {
        status::fleet_stats(&self.readings, self.now(), &self.thresholds)
    }

    pub fn status_records(&self) -> Vec<StatusRecord> {
        report::status_records(&self.readings, &self.hierarchy, self.now(), &self.thresholds)
    }

    pub async fn toggle_region(&mut self, region: &str) -> Result<bool, OverlayError> {
        self.controller
            .toggle_region(region, &self.boundaries, &mut self.surface)
            .await
    }

    /// Toggles the boundary overlay of a province through its region code.
    pub async fn toggle_province_boundary(&mut self, province: &str) -> Result<bool, OverlayError> {
        let Some(code) = self.hierarchy.region_code(province).map(str::to_string) else {
            self.surface
                .show_message(&format!("No boundary is known for {}", province));
            return Err(OverlayError::Missing(province.to_string()));
        };
        self.toggle_region(&code).await
    }

    /// Runs a marker's action.
    pub async fn activate(&mut self, action: MarkerAction) -> EventOutcome {
        let result = match &action {
            MarkerAction::SelectProvince { province } => self.select_province(province).await,
            MarkerAction::SelectMunicipality {
                province,
                municipality,
            } => self.select_municipality(province, municipality).await,
            MarkerAction::SelectBarangay {
                province,
                municipality,
                barangay,
            } => {
                return match self.barangay_devices(province, municipality, barangay).await {
                    Ok(rows) => EventOutcome::Devices(rows),
                    Err(e) => EventOutcome::Failed(e.to_string()),
                };
            }
        };

        match result {
            Ok(true) => {
                let tier = self.controller.viewport().visible_tier;
                EventOutcome::Drilled {
                    tier,
                    markers: self.controller.markers(tier).len(),
                }
            }
            Ok(false) => EventOutcome::Idle,
            Err(e) => EventOutcome::Failed(e.to_string()),
        }
    }

    pub async fn handle(&mut self, event: MapEvent) -> EventOutcome {
        match event {
            MapEvent::ZoomChanged(zoom) => EventOutcome::Zoomed(self.set_zoom(zoom)),
            MapEvent::MarkerClicked(id) => match self.controller.marker_action(&id).cloned() {
                Some(action) => self.activate(action).await,
                None => EventOutcome::Idle,
            },
            MapEvent::PopupMounted(id) => match self.controller.marker_action(&id) {
                Some(action) => EventOutcome::PopupBound(action.clone()),
                None => EventOutcome::Idle,
            },
            MapEvent::RegionToggled(region) => match self.toggle_region(&region).await {
                Ok(shown) => EventOutcome::Overlay { region, shown },
                Err(e) => EventOutcome::Failed(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::hierarchy::fixtures;
    use crate::map::{LayerTree, MemoryBoundaries};
    use crate::telemetry::query::{
        ALL_READINGS_PATH, BARANGAY_PATH, DETAILS_PATH, MUNICIPALITY_PATH,
    };
    use crate::telemetry::reading::fixtures::at;
    use crate::telemetry::{Cache, MemoryEndpoint};
    use serde_json::{json, Value};

    fn reading(id: &str, ts: &str) -> Value {
        json!({"SOCID": id, "solv": 13.0, "solc": 0.5, "batsoc": 40, "timestamp": ts})
    }

    fn endpoint() -> MemoryEndpoint {
        MemoryEndpoint::new()
            .with(
                ALL_READINGS_PATH,
                &[],
                json!({"status": "success", "data": [
                    reading("BTU-001AB", "2024-03-14 10:00:00"),
                    reading("BTU-002CD", "2024-03-14 03:00:00"),
                    reading("CAB-010EF", "2024-03-14 10:00:00"),
                    reading("broken", "2024-03-14 10:00:00"),
                ]}),
            )
            .with(
                MUNICIPALITY_PATH,
                &[("municipality", "BTU")],
                json!({"status": "success", "data": [
                    reading("BTU-001AB", "2024-03-14 10:00:00"),
                    reading("BTU-002CD", "2024-03-14 03:00:00"),
                ]}),
            )
            .with(
                BARANGAY_PATH,
                &[("municipality", "BTU"), ("barangay", "001")],
                json!({"status": "success", "data": [
                    reading("BTU-001AB", "2024-03-14 09:00:00"),
                    reading("BTU-001AB", "2024-03-14 10:00:00"),
                ]}),
            )
            .failing(
                MUNICIPALITY_PATH,
                &[("municipality", "CAB")],
                QueryError::Transport("connection reset".to_string()),
            )
    }

    fn dashboard(endpoint: MemoryEndpoint) -> Dashboard<MemoryEndpoint, MemoryBoundaries, LayerTree> {
        Dashboard::new(
            QueryLayer::new(endpoint, Cache::default()),
            MemoryBoundaries::default().with("16", json!({"type": "FeatureCollection"})),
            LayerTree::default(),
            fixtures::agusan(),
            MapSettings::default(),
            StatusThresholds::default(),
        )
        .with_clock(|| at(10, 20))
    }

    #[tokio::test]
    async fn load_shows_provinces() {
        let mut dash = dashboard(endpoint());
        dash.load().await.unwrap();

        assert_eq!(dash.surface().attached_tiers(), vec![Tier::Province]);
        let provinces = dash.surface().attached(Tier::Province).unwrap();
        assert_eq!(provinces.names(), ["Agusan", "Surigao"]);
        assert_eq!(
            dash.fleet_stats(),
            FleetStats {
                total: 3,
                active: 2,
                inactive: 1
            }
        );
    }

    #[tokio::test]
    async fn failed_load_degrades_to_empty_tier() {
        let failing = MemoryEndpoint::new().with(
            ALL_READINGS_PATH,
            &[],
            json!({"status": "error", "message": "maintenance"}),
        );
        let mut dash = dashboard(failing);

        let err = dash.load().await.unwrap_err();
        assert!(err.is_remote());
        assert_eq!(dash.surface().attached_tiers(), vec![Tier::Province]);
        assert!(dash.surface().attached(Tier::Province).unwrap().is_empty());
        assert_eq!(dash.surface().messages().len(), 1);
    }

    #[tokio::test]
    async fn drill_down_through_tiers() {
        let mut dash = dashboard(endpoint());
        dash.load().await.unwrap();

        let outcome = dash
            .handle(MapEvent::MarkerClicked("province:Agusan".to_string()))
            .await;
        assert_eq!(
            outcome,
            EventOutcome::Drilled {
                tier: Tier::Municipality,
                markers: 2
            }
        );
        assert_eq!(dash.surface().attached_tiers(), vec![Tier::Municipality]);
        assert_eq!(dash.query().endpoint().call_count(ALL_READINGS_PATH), 1);

        let outcome = dash
            .handle(MapEvent::MarkerClicked("municipality:Agusan:Butuan".to_string()))
            .await;
        assert_eq!(
            outcome,
            EventOutcome::Drilled {
                tier: Tier::Barangay,
                markers: 2
            }
        );
        let barangays = dash.surface().attached(Tier::Barangay).unwrap();
        assert_eq!(barangays.names(), ["Libertad", "Ampayon"]);

        let outcome = dash
            .handle(MapEvent::MarkerClicked("barangay:Agusan:Butuan:Libertad".to_string()))
            .await;
        match outcome {
            EventOutcome::Devices(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].status, Status::Active);
                assert_eq!(rows[0].reading.timestamp, at(10, 0));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_municipality_fetch_shows_empty_barangay_tier() {
        let mut dash = dashboard(endpoint());
        dash.load().await.unwrap();
        dash.select_province("Agusan").await.unwrap();

        let outcome = dash
            .handle(MapEvent::MarkerClicked("municipality:Agusan:Cabadbaran".to_string()))
            .await;
        assert!(matches!(outcome, EventOutcome::Failed(_)));
        assert_eq!(dash.surface().attached_tiers(), vec![Tier::Barangay]);
        assert!(dash.surface().attached(Tier::Barangay).unwrap().is_empty());
        assert_eq!(dash.surface().messages().len(), 1);
    }

    #[tokio::test]
    async fn popup_mount_binds_marker_action() {
        let mut dash = dashboard(endpoint());
        dash.load().await.unwrap();

        let outcome = dash
            .handle(MapEvent::PopupMounted("province:Surigao".to_string()))
            .await;
        assert_eq!(
            outcome,
            EventOutcome::PopupBound(MarkerAction::SelectProvince {
                province: "Surigao".to_string()
            })
        );
        assert_eq!(
            dash.handle(MapEvent::PopupMounted("province:Nowhere".to_string())).await,
            EventOutcome::Idle
        );
    }

    #[tokio::test]
    async fn region_toggle_is_independent_of_tiers() {
        let mut dash = dashboard(endpoint());
        dash.load().await.unwrap();

        let outcome = dash.handle(MapEvent::RegionToggled("16".to_string())).await;
        assert_eq!(
            outcome,
            EventOutcome::Overlay {
                region: "16".to_string(),
                shown: true
            }
        );
        assert_eq!(dash.surface().overlays(), vec!["16"]);
        assert_eq!(dash.surface().attached_tiers(), vec![Tier::Province]);
    }

    #[tokio::test]
    async fn province_boundary_uses_region_code() {
        let mut dash = Dashboard::new(
            QueryLayer::new(endpoint(), Cache::default()),
            MemoryBoundaries::default().with("AGN", json!({"type": "FeatureCollection"})),
            LayerTree::default(),
            fixtures::agusan(),
            MapSettings::default(),
            StatusThresholds::default(),
        );
        dash.load().await.unwrap();

        assert!(dash.toggle_province_boundary("Agusan").await.unwrap());
        assert_eq!(dash.surface().overlays(), vec!["AGN"]);

        assert!(dash.toggle_province_boundary("Surigao").await.is_err());
        assert_eq!(dash.surface().overlays(), vec!["AGN"]);
        assert_eq!(dash.surface().messages().len(), 1);
    }

    #[tokio::test]
    async fn details_resolve_location_and_status() {
        let endpoint = endpoint()
            .with(
                DETAILS_PATH,
                &[("socid", "BTU-001AB")],
                json!({"status": "success", "data": [
                    reading("BTU-001AB", "2024-03-14 10:00:00"),
                    reading("BTU-001AB", "2024-03-14 08:00:00"),
                ]}),
            )
            .with(
                DETAILS_PATH,
                &[("socid", "ZZZ-001AB")],
                json!({"status": "success", "data": []}),
            );
        let dash = dashboard(endpoint);

        let details = dash.device_details("BTU-001AB").await.unwrap();
        assert_eq!(details.location_label(), "Libertad, Butuan, Agusan");
        assert_eq!(details.latest().unwrap().timestamp, at(10, 0));
        assert_eq!(details.status, Some(Status::Active));

        let unknown = dash.device_details("ZZZ-001AB").await.unwrap();
        assert_eq!(unknown.location_label(), UNKNOWN_LOCATION);
        assert_eq!(unknown.status, None);
    }
}
