use thiserror::Error;

/// Failures surfaced by the query layer. Everything else in the crate
/// reports misses through `Option`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Endpoint reported an error: {message}")]
    Remote { message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl QueryError {
    pub fn is_remote(&self) -> bool {
        matches!(self, QueryError::Remote { .. })
    }
}

/// A device id that does not decode into exactly two segments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Device id {0:?} is not of the form MUNICIPALITY-SUFFIX")]
    Malformed(String),

    #[error("Device id {0:?} has an empty segment")]
    EmptySegment(String),
}

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("No boundary document for region {0}")]
    Missing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Failure loading the coordinate hierarchy at startup.
#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
