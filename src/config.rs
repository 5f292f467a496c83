//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `streetlight.toml`.
//!     loads configuration from file; callers fall back to defaults.
//!
//! structure:
//!     - ApiConfig: where the read endpoints live.
//!     - CacheConfig: how long fetched datasets stay fresh.
//!     - MapSettings: zoom thresholds and the fallback centre.
//!     - DataConfig: coordinate hierarchy and boundary documents.
//!     - StatusThresholds: limits used to classify devices.
//!     - LoggingConfig: log level and directory.
//!
//! ==============================================================================

use crate::error::ConfigError;
use crate::map::MapSettings;
use crate::status::StatusThresholds;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub map: MapSettings,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub status: StatusThresholds,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 30 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub coordinates_path: PathBuf,
    pub boundaries_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            coordinates_path: PathBuf::from("data").join("coordinates.json"),
            boundaries_dir: PathBuf::from("data").join("regions"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        if !config.map.is_ordered() {
            return Err(ConfigError::Invalid(format!(
                "zoom levels must satisfy province_zoom < city_zoom < municipality_zoom (got {} / {} / {})",
                config.map.province_zoom, config.map.city_zoom, config.map.municipality_zoom
            )));
        }
        config.status.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// First config file found in the usual places
    pub fn find() -> Option<PathBuf> {
        [
            PathBuf::from("config").join("streetlight.toml"),
            PathBuf::from("..").join("config").join("streetlight.toml"),
        ]
        .into_iter()
        .find(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.cache.ttl(), Duration::from_secs(30));
        assert_eq!(config.map.city_zoom, 10.0);
        assert_eq!(config.status.min_battery_soc, 20.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn sections_override_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [api]
            base_url = "https://lights.example.org"

            [cache]
            ttl_seconds = 5

            [map]
            city_zoom = 11
            municipality_zoom = 14

            [status]
            min_battery_soc = 30.0
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://lights.example.org");
        assert_eq!(config.cache.ttl_seconds, 5);
        assert_eq!(config.map.city_zoom, 11.0);
        assert_eq!(config.map.province_zoom, 8.0);
        assert_eq!(config.status.min_battery_soc, 30.0);
        assert_eq!(config.status.min_panel_voltage, 12.0);
    }

    #[test]
    fn rejects_unordered_zooms() {
        let result = AppConfig::from_toml("[map]\ncity_zoom = 14\nmunicipality_zoom = 12\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_out_of_range_status_limits() {
        let huge_age = AppConfig::from_toml("[status]\nmax_age_minutes = 9223372036854775807\n");
        assert!(matches!(huge_age, Err(ConfigError::Invalid(_))));

        let inverted_day = AppConfig::from_toml("[status]\nday_start_hour = 18\nday_end_hour = 6\n");
        assert!(matches!(inverted_day, Err(ConfigError::Invalid(_))));

        let night_shift = AppConfig::from_toml("[status]\nday_start_hour = 5\nday_end_hour = 19\n").unwrap();
        assert_eq!(night_shift.status.day_start_hour, 5);
    }
}
