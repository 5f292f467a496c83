use crate::telemetry::Reading;
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    pub fn is_active(self) -> bool {
        self == Status::Active
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Active => f.write_str("active"),
            Status::Inactive => f.write_str("inactive"),
        }
    }
}

/// Longest staleness window accepted from configuration: one year.
pub const MAX_AGE_LIMIT_MINUTES: i64 = 365 * 24 * 60;

/// Operating limits for a healthy streetlight.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusThresholds {
    /// Readings at least this old are stale.
    pub max_age_minutes: i64,
    /// First daytime hour, inclusive.
    pub day_start_hour: u32,
    /// First nighttime hour, inclusive.
    pub day_end_hour: u32,
    pub min_panel_voltage: f64,
    pub min_panel_current: f64,
    pub min_battery_soc: f64,
    pub min_bulb_voltage: f64,
    /// Battery current must be below this at night (negative = discharging).
    pub max_night_battery_current: f64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            max_age_minutes: 60,
            day_start_hour: 6,
            day_end_hour: 18,
            min_panel_voltage: 12.0,
            min_panel_current: 0.1,
            min_battery_soc: 20.0,
            min_bulb_voltage: 10.0,
            max_night_battery_current: -0.1,
        }
    }
}

impl StatusThresholds {
    pub fn is_daytime(&self, timestamp: NaiveDateTime) -> bool {
        (self.day_start_hour..self.day_end_hour).contains(&timestamp.hour())
    }

    pub fn is_stale(&self, reading: &Reading, now: NaiveDateTime) -> bool {
        TimeDelta::try_minutes(self.max_age_minutes)
            .is_some_and(|max_age| now - reading.timestamp >= max_age)
    }

    /// Checks the limits are usable: a positive staleness window of at most
    /// a year, and a non-empty daytime inside the 24 hours of a day.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_AGE_LIMIT_MINUTES).contains(&self.max_age_minutes) {
            return Err(format!(
                "max_age_minutes must be between 1 and {} (got {})",
                MAX_AGE_LIMIT_MINUTES, self.max_age_minutes
            ));
        }
        if self.day_start_hour >= self.day_end_hour || self.day_end_hour > 24 {
            return Err(format!(
                "daytime hours must satisfy day_start_hour < day_end_hour <= 24 (got {} / {})",
                self.day_start_hour, self.day_end_hour
            ));
        }
        Ok(())
    }

    /// By day the panel should be charging the battery.
    fn charging(&self, reading: &Reading) -> bool {
        reading.panel_voltage > self.min_panel_voltage
            && reading.panel_current > self.min_panel_current
            && reading.battery_soc > self.min_battery_soc
    }

    /// By night the battery should be driving the lamp.
    fn discharging(&self, reading: &Reading) -> bool {
        reading.battery_soc > self.min_battery_soc
            && reading.bulb_voltage > self.min_bulb_voltage
            && reading.battery_current < self.max_night_battery_current
    }

    pub fn classify(&self, reading: &Reading, now: NaiveDateTime) -> Status {
        if self.is_stale(reading, now) || reading.is_all_zero() {
            return Status::Inactive;
        }

        let healthy = if self.is_daytime(reading.timestamp) {
            self.charging(reading)
        } else {
            self.discharging(reading)
        };

        if healthy { Status::Active } else { Status::Inactive }
    }
}

/// Classifies with the default thresholds.
pub fn classify(reading: &Reading, now: NaiveDateTime) -> Status {
    StatusThresholds::default().classify(reading, now)
}
