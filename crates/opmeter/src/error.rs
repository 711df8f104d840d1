//! Error types for opmeter

use thiserror::Error;

/// Result type alias for opmeter operations
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Unified error type for all opmeter operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// Invalid threshold, sampling rate or environment value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Programmer error such as a checkpoint on an ended timer
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl MetricsError {
    /// Returns true if this error came from validating configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, MetricsError::Configuration(_))
    }
}

impl From<serde_json::Error> for MetricsError {
    fn from(err: serde_json::Error) -> Self {
        MetricsError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for MetricsError {
    fn from(err: serde_yaml::Error) -> Self {
        MetricsError::Serialization(format!("YAML error: {}", err))
    }
}

impl From<std::io::Error> for MetricsError {
    fn from(err: std::io::Error) -> Self {
        MetricsError::Storage(err.to_string())
    }
}
