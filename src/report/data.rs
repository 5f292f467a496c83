use serde::Serialize;

#[derive(Debug, Serialize, PartialEq)]
pub struct StatusRecord {
    pub id: String,
    pub province: String,
    pub municipality: String,
    pub barangay: String,
    pub timestamp: String, // device wall-clock time of the latest reading
    #[serde(rename = "battery_SOC")]
    pub battery_soc: f64,
    pub status: String, // "active" or "inactive"
}
