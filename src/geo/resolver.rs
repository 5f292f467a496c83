use crate::error::IdError;
use crate::geo::hierarchy::{CoordinateHierarchy, Municipality};
use tracing::warn;

/// Characters of the suffix that name the barangay.
pub const BARANGAY_PREFIX_LEN: usize = 3;

/// Shown wherever a device id resolves to no place.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// The administrative part of a device id such as `BTU-0012AB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub municipality_code: String,
    pub barangay_prefix: String,
}

impl DeviceId {
    pub fn parse(id: &str) -> Result<Self, IdError> {
        let segments: Vec<&str> = id.trim().split('-').collect();
        let [municipality, suffix] = segments.as_slice() else {
            return Err(IdError::Malformed(id.to_string()));
        };
        if municipality.is_empty() || suffix.is_empty() {
            return Err(IdError::EmptySegment(id.to_string()));
        }

        Ok(DeviceId {
            municipality_code: municipality.to_string(),
            barangay_prefix: suffix.chars().take(BARANGAY_PREFIX_LEN).collect(),
        })
    }

    /// Does this id belong to the barangay with the given code or name?
    pub fn matches_barangay(&self, code: &str, name: &str) -> bool {
        starts_with_ignore_case(code, &self.barangay_prefix)
            || starts_with_ignore_case(name, &self.barangay_prefix)
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    let mut chars = haystack.chars();
    prefix.chars().all(|p| {
        chars
            .next()
            .is_some_and(|h| h.to_lowercase().eq(p.to_lowercase()))
    })
}

/// Parses an id, logging and discarding it when malformed.
pub fn parse(id: &str) -> Option<DeviceId> {
    match DeviceId::parse(id) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub province: String,
    pub municipality: String,
    pub barangay: String,
}

/// Reverse-geocodes a device id. When two barangays share a prefix the
/// first one in document order wins.
pub fn locate(id: &str, hierarchy: &CoordinateHierarchy) -> Option<Location> {
    let device = parse(id)?;
    locate_parsed(&device, hierarchy)
}

pub fn locate_parsed(device: &DeviceId, hierarchy: &CoordinateHierarchy) -> Option<Location> {
    for (province_name, province) in &hierarchy.provinces {
        for (municipality_name, municipality) in &province.municipalities {
            if municipality.municipality_code != device.municipality_code {
                continue;
            }
            if let Some(barangay) = barangay_for(device, municipality) {
                return Some(Location {
                    province: province_name.clone(),
                    municipality: municipality_name.clone(),
                    barangay: barangay.to_string(),
                });
            }
        }
    }
    None
}

/// Name of the barangay a device belongs to within `municipality`: the
/// first, in document order, whose code or name starts with its prefix.
/// Does not check the municipality code.
pub fn barangay_for<'a>(device: &DeviceId, municipality: &'a Municipality) -> Option<&'a str> {
    municipality
        .barangays
        .iter()
        .find(|(name, b)| device.matches_barangay(&b.barangay_code, name))
        .map(|(name, _)| name.as_str())
}
