pub mod data;

use crate::error::ReportError;
use crate::geo::resolver::{self, UNKNOWN_LOCATION};
use crate::geo::CoordinateHierarchy;
use crate::status::{latest_per_device, StatusThresholds};
use crate::telemetry::reading::TIMESTAMP_FORMAT;
use crate::telemetry::Reading;
use chrono::NaiveDateTime;
use csv::Writer;
pub use data::StatusRecord;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// One record per device, built from its latest reading.
pub fn status_records(
    readings: &[Reading],
    hierarchy: &CoordinateHierarchy,
    now: NaiveDateTime,
    thresholds: &StatusThresholds,
) -> Vec<StatusRecord> {
    latest_per_device(readings)
        .into_iter()
        .map(|latest| {
            let location = resolver::locate_parsed(&latest.device, hierarchy);
            let (province, municipality, barangay) = match location {
                Some(l) => (l.province, l.municipality, l.barangay),
                None => (UNKNOWN_LOCATION.to_string(), String::new(), String::new()),
            };
            StatusRecord {
                id: latest.reading.id.clone(),
                province,
                municipality,
                barangay,
                timestamp: latest.reading.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                battery_soc: latest.reading.battery_soc,
                status: thresholds.classify(latest.reading, now).to_string(),
            }
        })
        .collect()
}

pub fn write_status_report<W: Write>(records: &[StatusRecord], out: W) -> Result<(), ReportError> {
    let mut writer = Writer::from_writer(out);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Save the status records to a timestamped CSV file under `dir`
pub fn save_status_report(records: &[StatusRecord], dir: &Path) -> Result<PathBuf, ReportError> {
    let name = chrono::Local::now()
        .format("streetlight_status_%Y-%m-%d_%H-%M-%S.csv")
        .to_string();

    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);

    let file = File::create(&path)?;
    write_status_report(records, file)?;

    info!("Status report with {} devices saved to {}", records.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::hierarchy::fixtures;
    use crate::telemetry::reading::fixtures::{at, charging};

    #[test]
    fn one_row_per_device_with_location() {
        let readings = vec![
            charging("BTU-001AB", at(9, 0)),
            charging("BTU-001AB", at(10, 0)),
            charging("ZZZ-001AB", at(10, 0)),
            charging("garbage", at(10, 0)),
        ];
        let records = status_records(
            &readings,
            &fixtures::agusan(),
            at(10, 5),
            &StatusThresholds::default(),
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "BTU-001AB");
        assert_eq!(records[0].barangay, "Libertad");
        assert_eq!(records[0].timestamp, "2024-03-14 10:00:00");
        assert_eq!(records[0].status, "active");
        assert_eq!(records[1].province, UNKNOWN_LOCATION);
    }

    #[test]
    fn writes_csv_with_header() {
        let records = vec![StatusRecord {
            id: "BTU-001AB".to_string(),
            province: "Agusan".to_string(),
            municipality: "Butuan".to_string(),
            barangay: "Libertad".to_string(),
            timestamp: "2024-03-14 10:00:00".to_string(),
            battery_soc: 25.0,
            status: "active".to_string(),
        }];
        let mut out = Vec::new();
        write_status_report(&records, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,province,municipality,barangay,timestamp,battery_SOC,status")
        );
        assert_eq!(
            lines.next(),
            Some("BTU-001AB,Agusan,Butuan,Libertad,2024-03-14 10:00:00,25.0,active")
        );
    }
}
