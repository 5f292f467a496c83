//! Province → municipality → barangay coordinate document.
//!
//! The document is a JSON object keyed by province name. Key order is
//! kept as written, since barangay lookups resolve to the first match.

use crate::error::HierarchyError;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Barangay {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default, alias = "lng")]
    pub long: Option<f64>,
    #[serde(default, alias = "code")]
    pub barangay_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Municipality {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default, alias = "lng")]
    pub long: Option<f64>,
    #[serde(default, alias = "code")]
    pub municipality_code: String,
    #[serde(default, deserialize_with = "ordered")]
    pub barangays: Vec<(String, Barangay)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Province {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default, alias = "lng")]
    pub long: Option<f64>,
    /// Region code naming the province's boundary overlay.
    #[serde(default, alias = "code", alias = "region_code")]
    pub province_code: Option<String>,
    #[serde(default, deserialize_with = "ordered")]
    pub municipalities: Vec<(String, Municipality)>,
}

/// Read-only for the lifetime of a session.
#[derive(Debug, Clone, Default)]
pub struct CoordinateHierarchy {
    pub provinces: Vec<(String, Province)>,
}

impl<'de> Deserialize<'de> for CoordinateHierarchy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(CoordinateHierarchy {
            provinces: ordered(deserializer)?,
        })
    }
}

fn position(lat: Option<f64>, long: Option<f64>) -> Option<LatLng> {
    match (lat, long) {
        (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some(LatLng { lat, lng }),
        _ => None,
    }
}

impl Province {
    pub fn position(&self) -> Option<LatLng> {
        position(self.lat, self.long)
    }

    /// Worth a marker: placed on the map and has at least one municipality.
    pub fn is_eligible(&self) -> bool {
        self.position().is_some() && !self.municipalities.is_empty()
    }

    pub fn municipality(&self, name: &str) -> Option<&Municipality> {
        self.municipalities
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m)
    }
}

impl Municipality {
    pub fn position(&self) -> Option<LatLng> {
        position(self.lat, self.long)
    }

    pub fn barangay(&self, name: &str) -> Option<&Barangay> {
        self.barangays
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
    }
}

impl Barangay {
    pub fn position(&self) -> Option<LatLng> {
        position(self.lat, self.long)
    }
}

impl CoordinateHierarchy {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HierarchyError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let hierarchy = Self::from_json(&content)?;
        info!(
            "Loaded {} provinces from {}",
            hierarchy.provinces.len(),
            path.as_ref().display()
        );
        Ok(hierarchy)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn province(&self, name: &str) -> Option<&Province> {
        self.provinces
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    pub fn eligible_provinces(&self) -> impl Iterator<Item = (&str, &Province)> {
        self.provinces
            .iter()
            .filter(|(_, p)| p.is_eligible())
            .map(|(n, p)| (n.as_str(), p))
    }

    /// Mean position of every eligible province, if there is one.
    pub fn centroid(&self) -> Option<LatLng> {
        let points: Vec<LatLng> = self
            .eligible_provinces()
            .filter_map(|(_, p)| p.position())
            .collect();
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        Some(LatLng {
            lat: points.iter().map(|p| p.lat).sum::<f64>() / n,
            lng: points.iter().map(|p| p.lng).sum::<f64>() / n,
        })
    }

    /// Code of the boundary overlay drawn for a province.
    pub fn region_code(&self, province: &str) -> Option<&str> {
        self.province(province)
            .and_then(|p| p.province_code.as_deref())
    }

    /// Municipality codes under a province.
    pub fn municipality_codes<'a>(&'a self, province: &str) -> Vec<&'a str> {
        self.province(province)
            .map(|p| {
                p.municipalities
                    .iter()
                    .map(|(_, m)| m.municipality_code.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Decodes a JSON object into name/value pairs, in document order.
fn ordered<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct OrderedVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map keyed by name")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, value)) = access.next_entry::<String, T>()? {
                entries.push((name, value));
            }
            Ok(entries)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(OrderedVisitor(PhantomData))
}
