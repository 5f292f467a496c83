use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Wire format used by the endpoints for reading timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One timestamped sample from a streetlight controller.
///
/// Endpoints disagree on the casing of the id field (`SOCID` vs `socid`)
/// and sometimes send numbers as strings, so decoding accepts both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(alias = "SOCID", alias = "socid", alias = "SocId")]
    pub id: String,

    #[serde(alias = "bulbVoltage", alias = "bulbv", default, deserialize_with = "lenient_f64")]
    pub bulb_voltage: f64,

    #[serde(alias = "currentDraw", alias = "curv", default, deserialize_with = "lenient_f64")]
    pub current_draw: f64,

    #[serde(alias = "panelVoltage", alias = "solv", default, deserialize_with = "lenient_f64")]
    pub panel_voltage: f64,

    #[serde(alias = "panelCurrent", alias = "solc", default, deserialize_with = "lenient_f64")]
    pub panel_current: f64,

    #[serde(alias = "batteryVoltage", alias = "batv", default, deserialize_with = "lenient_f64")]
    pub battery_voltage: f64,

    #[serde(alias = "batteryCurrent", alias = "batc", default, deserialize_with = "lenient_f64")]
    pub battery_current: f64,

    #[serde(
        alias = "batterySOC",
        alias = "betterySOC",
        alias = "batsoc",
        default,
        deserialize_with = "lenient_f64"
    )]
    pub battery_soc: f64,

    #[serde(alias = "Timestamp", alias = "TIMESTAMP", with = "timestamp")]
    pub timestamp: NaiveDateTime,
}

impl Reading {
    /// Every numeric channel, in a fixed order.
    pub fn channels(&self) -> [f64; 7] {
        [
            self.panel_voltage,
            self.panel_current,
            self.bulb_voltage,
            self.current_draw,
            self.battery_voltage,
            self.battery_current,
            self.battery_soc,
        ]
    }

    /// True when the controller reported nothing but zeros.
    pub fn is_all_zero(&self) -> bool {
        self.channels().iter().all(|v| *v == 0.0)
    }
}

/// Accepts JSON numbers, numeric strings and `null` (read as 0).
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom(format!("Number {} is not representable as f64", n))),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(0.0)
            } else {
                trimmed
                    .parse::<f64>()
                    .map_err(|_| D::Error::custom(format!("Non-numeric value {:?}", s)))
            }
        }
        Some(Value::Null) | None => Ok(0.0),
        Some(other) => Err(D::Error::custom(format!(
            "Unexpected type for numeric field: {:?}",
            other
        ))),
    }
}

pub(crate) mod timestamp {
    use super::*;

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("Unrecognised timestamp {:?}", raw)))
    }

    /// Wall-clock time as written by the device. Offsets, when present,
    /// are dropped rather than converted.
    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(ts);
            }
        }
        DateTime::parse_from_rfc3339(raw).ok().map(|ts| ts.naive_local())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::NaiveDate;

    pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 14)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .unwrap()
    }

    /// A reading that passes the daytime checks.
    pub fn charging(id: &str, timestamp: NaiveDateTime) -> Reading {
        Reading {
            id: id.to_string(),
            bulb_voltage: 0.0,
            current_draw: 0.0,
            panel_voltage: 13.0,
            panel_current: 0.5,
            battery_voltage: 12.6,
            battery_current: 0.4,
            battery_soc: 25.0,
            timestamp,
        }
    }

    /// A reading that passes the nighttime checks.
    pub fn discharging(id: &str, timestamp: NaiveDateTime) -> Reading {
        Reading {
            id: id.to_string(),
            bulb_voltage: 11.5,
            current_draw: 0.8,
            panel_voltage: 0.2,
            panel_current: 0.0,
            battery_voltage: 12.2,
            battery_current: -0.6,
            battery_soc: 60.0,
            timestamp,
        }
    }
}
