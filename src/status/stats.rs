use crate::geo::resolver::{self, DeviceId};
use crate::status::classifier::{Status, StatusThresholds};
use crate::telemetry::Reading;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

/// A device's most recent reading together with its decoded id.
#[derive(Debug, Clone)]
pub struct LatestReading<'a> {
    pub device: DeviceId,
    pub reading: &'a Reading,
}

/// Reduces a reading stream to the newest reading per device id, in id
/// order. Readings with malformed ids are dropped.
pub fn latest_per_device(readings: &[Reading]) -> Vec<LatestReading<'_>> {
    let mut latest: BTreeMap<&str, LatestReading<'_>> = BTreeMap::new();
    for reading in readings {
        if let Some(current) = latest.get_mut(reading.id.as_str()) {
            if reading.timestamp > current.reading.timestamp {
                current.reading = reading;
            }
            continue;
        }
        let Some(device) = resolver::parse(&reading.id) else {
            continue;
        };
        latest.insert(reading.id.as_str(), LatestReading { device, reading });
    }
    latest.into_values().collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

impl FleetStats {
    pub fn record(&mut self, status: Status) {
        self.total += 1;
        match status {
            Status::Active => self.active += 1,
            Status::Inactive => self.inactive += 1,
        }
    }
}

/// Statistics over the whole fleet.
pub fn fleet_stats(
    readings: &[Reading],
    now: NaiveDateTime,
    thresholds: &StatusThresholds,
) -> FleetStats {
    stats_where(readings, now, thresholds, |_| true)
}

/// Statistics over the devices accepted by `filter`.
pub fn stats_where<F>(
    readings: &[Reading],
    now: NaiveDateTime,
    thresholds: &StatusThresholds,
    filter: F,
) -> FleetStats
where
    F: Fn(&DeviceId) -> bool,
{
    let mut stats = FleetStats::default();
    for latest in latest_per_device(readings) {
        if filter(&latest.device) {
            stats.record(thresholds.classify(latest.reading, now));
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::reading::fixtures::{at, charging, discharging};

    #[test]
    fn keeps_newest_reading_per_id() {
        let mut old = charging("BTU-001AB", at(8, 0));
        old.battery_soc = 80.0;
        let newest = charging("BTU-001AB", at(10, 0));
        let middle = charging("BTU-001AB", at(9, 0));
        let readings = vec![old, newest.clone(), middle];

        let latest = latest_per_device(&readings);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].reading, &newest);
    }

    #[test]
    fn only_newest_reading_is_classified() {
        // An older healthy sample must not mask a newer dead one.
        let healthy = charging("BTU-001AB", at(9, 30));
        let mut dead = charging("BTU-001AB", at(10, 0));
        dead.panel_voltage = 0.0;
        let readings = vec![dead, healthy];

        let stats = fleet_stats(&readings, at(10, 5), &StatusThresholds::default());
        assert_eq!(
            stats,
            FleetStats {
                total: 1,
                active: 0,
                inactive: 1
            }
        );
    }

    #[test]
    fn malformed_ids_are_excluded() {
        let readings = vec![
            charging("BTU-001AB", at(10, 0)),
            charging("BTU001AB", at(10, 0)),
            charging("A-B-C", at(10, 0)),
        ];
        assert_eq!(latest_per_device(&readings).len(), 1);
    }

    #[test]
    fn stats_by_municipality() {
        let readings = vec![
            charging("BTU-001AB", at(10, 0)),
            charging("BTU-002AB", at(4, 0)),
            discharging("CAB-010AA", at(21, 0)),
        ];
        let thresholds = StatusThresholds::default();

        let butuan = stats_where(&readings, at(10, 10), &thresholds, |d| {
            d.municipality_code == "BTU"
        });
        assert_eq!(butuan.total, 2);
        assert_eq!(butuan.active, 1);
        assert_eq!(butuan.inactive, 1);
    }
}
