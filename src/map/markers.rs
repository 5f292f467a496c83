use crate::geo::hierarchy::{CoordinateHierarchy, LatLng};
use crate::geo::resolver::{self, DeviceId};
use crate::map::controller::Tier;
use crate::status::stats::{self, FleetStats};
use crate::status::{Status, StatusThresholds};
use crate::telemetry::Reading;
use chrono::NaiveDateTime;

/// What a marker does when clicked, fixed when the marker is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerAction {
    SelectProvince {
        province: String,
    },
    SelectMunicipality {
        province: String,
        municipality: String,
    },
    SelectBarangay {
        province: String,
        municipality: String,
        barangay: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: String,
    pub tier: Tier,
    pub name: String,
    pub position: LatLng,
    pub popup: String,
    pub action: MarkerAction,
}

/// The markers of one tier. Rebuilt wholesale, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSet {
    tier: Tier,
    markers: Vec<Marker>,
}

impl MarkerSet {
    pub fn new(tier: Tier) -> Self {
        MarkerSet {
            tier,
            markers: Vec::new(),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn push(&mut self, marker: Marker) {
        self.markers.push(marker);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }

    pub fn names(&self) -> Vec<&str> {
        self.markers.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Everything a popup shows. Built from pre-fetched data only.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupInput<'a> {
    pub name: &'a str,
    pub reading_count: usize,
    pub parents: Vec<&'a str>,
    pub stats: FleetStats,
}

pub fn popup_content(input: &PopupInput) -> String {
    let mut html = format!("<div class=\"popup\"><h3>{}</h3>", html_escape(input.name));
    if !input.parents.is_empty() {
        let trail: Vec<String> = input.parents.iter().map(|p| html_escape(p)).collect();
        html.push_str(&format!("<p class=\"trail\">{}</p>", trail.join(" &rsaquo; ")));
    }
    html.push_str(&format!(
        "<p>{} readings from {} devices</p>",
        input.reading_count, input.stats.total
    ));
    html.push_str(&format!(
        "<p><span class=\"active\">{} active</span> / <span class=\"inactive\">{} inactive</span></p>",
        input.stats.active, input.stats.inactive
    ));
    html.push_str("</div>");
    html
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Data shared by every builder call.
pub struct MarkerContext<'a> {
    pub hierarchy: &'a CoordinateHierarchy,
    pub readings: &'a [Reading],
    pub now: NaiveDateTime,
    pub thresholds: &'a StatusThresholds,
}

/// The reading stream reduced once per build: the decoded id of every
/// raw reading, and every device with the status of its latest reading.
struct Tally {
    readings: Vec<DeviceId>,
    devices: Vec<(DeviceId, Status)>,
}

impl Tally {
    fn new(ctx: &MarkerContext) -> Self {
        let readings = ctx
            .readings
            .iter()
            .filter_map(|r| DeviceId::parse(&r.id).ok())
            .collect();
        let devices = stats::latest_per_device(ctx.readings)
            .into_iter()
            .map(|latest| {
                let status = ctx.thresholds.classify(latest.reading, ctx.now);
                (latest.device, status)
            })
            .collect();
        Tally { readings, devices }
    }

    /// Raw reading count and device statistics for the ids `filter` accepts.
    fn count<F>(&self, filter: F) -> (usize, FleetStats)
    where
        F: Fn(&DeviceId) -> bool,
    {
        let reading_count = self.readings.iter().filter(|&d| filter(d)).count();
        let mut stats = FleetStats::default();
        for (device, status) in &self.devices {
            if filter(device) {
                stats.record(*status);
            }
        }
        (reading_count, stats)
    }
}

/// One marker per province that is placed and has municipalities.
pub fn build_province_markers(ctx: &MarkerContext) -> MarkerSet {
    let mut set = MarkerSet::new(Tier::Province);
    let tally = Tally::new(ctx);
    for (name, province) in ctx.hierarchy.eligible_provinces() {
        let Some(position) = province.position() else {
            continue;
        };
        let codes = ctx.hierarchy.municipality_codes(name);
        let (reading_count, stats) =
            tally.count(|d| codes.contains(&d.municipality_code.as_str()));

        let popup = popup_content(&PopupInput {
            name,
            reading_count,
            parents: Vec::new(),
            stats,
        });
        set.push(Marker {
            id: format!("province:{}", name),
            tier: Tier::Province,
            name: name.to_string(),
            position,
            popup,
            action: MarkerAction::SelectProvince {
                province: name.to_string(),
            },
        });
    }
    set
}

/// Municipalities of `province` that are placed and have readings.
pub fn build_municipality_markers(ctx: &MarkerContext, province: &str) -> MarkerSet {
    let mut set = MarkerSet::new(Tier::Municipality);
    let Some(parent) = ctx.hierarchy.province(province) else {
        return set;
    };
    let tally = Tally::new(ctx);

    for (name, municipality) in &parent.municipalities {
        let Some(position) = municipality.position() else {
            continue;
        };
        let code = municipality.municipality_code.as_str();
        let (reading_count, stats) = tally.count(|d| d.municipality_code == code);
        if reading_count == 0 {
            continue;
        }

        let popup = popup_content(&PopupInput {
            name,
            reading_count,
            parents: vec![province],
            stats,
        });
        set.push(Marker {
            id: format!("municipality:{}:{}", province, name),
            tier: Tier::Municipality,
            name: name.clone(),
            position,
            popup,
            action: MarkerAction::SelectMunicipality {
                province: province.to_string(),
                municipality: name.clone(),
            },
        });
    }
    set
}

/// Barangays of one municipality that are placed and have readings.
pub fn build_barangay_markers(
    ctx: &MarkerContext,
    province: &str,
    municipality: &str,
) -> MarkerSet {
    let mut set = MarkerSet::new(Tier::Barangay);
    let Some(parent) = ctx
        .hierarchy
        .province(province)
        .and_then(|p| p.municipality(municipality))
    else {
        return set;
    };
    let code = parent.municipality_code.as_str();
    let tally = Tally::new(ctx);

    // A device counts towards the one barangay `locate` gives it.
    for (name, barangay) in &parent.barangays {
        let Some(position) = barangay.position() else {
            continue;
        };
        let (reading_count, stats) = tally.count(|d| {
            d.municipality_code == code
                && resolver::barangay_for(d, parent) == Some(name.as_str())
        });
        if reading_count == 0 {
            continue;
        }

        let popup = popup_content(&PopupInput {
            name,
            reading_count,
            parents: vec![province, municipality],
            stats,
        });
        set.push(Marker {
            id: format!("barangay:{}:{}:{}", province, municipality, name),
            tier: Tier::Barangay,
            name: name.clone(),
            position,
            popup,
            action: MarkerAction::SelectBarangay {
                province: province.to_string(),
                municipality: municipality.to_string(),
                barangay: name.clone(),
            },
        });
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::hierarchy::fixtures;
    use crate::telemetry::reading::fixtures::{at, charging};

    fn context<'a>(
        hierarchy: &'a CoordinateHierarchy,
        readings: &'a [Reading],
        thresholds: &'a StatusThresholds,
    ) -> MarkerContext<'a> {
        MarkerContext {
            hierarchy,
            readings,
            now: at(10, 10),
            thresholds,
        }
    }

    #[test]
    fn provinces_need_position_and_municipalities_only() {
        let hierarchy = fixtures::agusan();
        let thresholds = StatusThresholds::default();
        let set = build_province_markers(&context(&hierarchy, &[], &thresholds));
        assert_eq!(set.names(), ["Agusan", "Surigao"]);
        assert_eq!(set.tier(), Tier::Province);
    }

    #[test]
    fn municipalities_need_matching_readings() {
        let hierarchy = fixtures::agusan();
        let thresholds = StatusThresholds::default();
        let readings = vec![
            charging("BTU-001AB", at(10, 0)),
            charging("BTU-001AB", at(9, 0)),
            charging("bad id", at(10, 0)),
        ];
        let set = build_municipality_markers(&context(&hierarchy, &readings, &thresholds), "Agusan");

        assert_eq!(set.names(), ["Butuan"]);
        let butuan = set.find("municipality:Agusan:Butuan").unwrap();
        assert_eq!(
            butuan.action,
            MarkerAction::SelectMunicipality {
                province: "Agusan".to_string(),
                municipality: "Butuan".to_string()
            }
        );
        assert!(butuan.popup.contains("2 readings from 1 devices"));
        assert!(butuan.popup.contains("1 active"));
    }

    #[test]
    fn unknown_province_builds_nothing() {
        let hierarchy = fixtures::agusan();
        let thresholds = StatusThresholds::default();
        let set = build_municipality_markers(&context(&hierarchy, &[], &thresholds), "Atlantis");
        assert!(set.is_empty());
    }

    #[test]
    fn barangays_match_on_prefix() {
        let hierarchy = fixtures::agusan();
        let thresholds = StatusThresholds::default();
        let readings = vec![
            charging("BTU-002XY", at(10, 0)),
            charging("CAB-001XY", at(10, 0)),
        ];
        let set = build_barangay_markers(
            &context(&hierarchy, &readings, &thresholds),
            "Agusan",
            "Butuan",
        );
        assert_eq!(set.names(), ["Ampayon"]);
    }

    #[test]
    fn shared_prefix_counts_towards_first_barangay_only() {
        let hierarchy = CoordinateHierarchy::from_json(
            r#"{"P": {"lat": 1.0, "long": 1.0, "municipalities": {
                "M": {"lat": 1.0, "long": 1.0, "municipality_code": "MMM", "barangays": {
                    "San Jose": {"lat": 1.1, "long": 1.1, "barangay_code": "101"},
                    "San Isidro": {"lat": 1.2, "long": 1.2, "barangay_code": "102"}
                }}
            }}}"#,
        )
        .unwrap();
        let thresholds = StatusThresholds::default();
        let readings = vec![charging("MMM-SAN01", at(10, 0))];

        let set = build_barangay_markers(&context(&hierarchy, &readings, &thresholds), "P", "M");
        assert_eq!(set.names(), ["San Jose"]);
        assert_eq!(
            crate::geo::locate("MMM-SAN01", &hierarchy).unwrap().barangay,
            "San Jose"
        );
    }

    #[test]
    fn barangay_counts_add_up_to_municipality() {
        let hierarchy = fixtures::agusan();
        let thresholds = StatusThresholds::default();
        let readings = vec![
            charging("BTU-001AB", at(10, 0)),
            charging("BTU-002AB", at(10, 0)),
            charging("BTU-002CD", at(3, 0)),
        ];
        let ctx = context(&hierarchy, &readings, &thresholds);

        let butuan = build_municipality_markers(&ctx, "Agusan");
        assert!(butuan.find("municipality:Agusan:Butuan").unwrap().popup.contains("3 readings from 3 devices"));

        let barangays = build_barangay_markers(&ctx, "Agusan", "Butuan");
        let libertad = barangays.find("barangay:Agusan:Butuan:Libertad").unwrap();
        let ampayon = barangays.find("barangay:Agusan:Butuan:Ampayon").unwrap();
        assert!(libertad.popup.contains("1 readings from 1 devices"));
        assert!(ampayon.popup.contains("2 readings from 2 devices"));
        assert!(ampayon.popup.contains("1 active"));
    }

    #[test]
    fn popup_escapes_and_lists_parents() {
        let html = popup_content(&PopupInput {
            name: "San <Jose>",
            reading_count: 4,
            parents: vec!["Agusan", "Butuan"],
            stats: FleetStats {
                total: 2,
                active: 1,
                inactive: 1,
            },
        });
        assert!(html.contains("<h3>San &lt;Jose&gt;</h3>"));
        assert!(html.contains("Agusan &rsaquo; Butuan"));
        assert!(html.contains("4 readings from 2 devices"));
    }
}
