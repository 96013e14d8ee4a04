use crate::record::ValidationError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating engine configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid server address: {0}")]
    InvalidServerAddress(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

/// Unified error type for the zone management engine
#[derive(Debug, Clone, Error)]
pub enum BifrostError {
    /// A record was rejected before reaching the server
    #[error("Invalid record {record}: {source}")]
    Validation {
        record: String,
        #[source]
        source: ValidationError,
    },

    /// The external update/control command failed or returned a non-NOERROR status
    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The server is not configured yet (missing credential or config files)
    #[error("Server not configured: {0}")]
    Configuration(String),

    #[error("Zone parse error: {0}")]
    ZoneParse(String),

    #[error("Zone check failed: {0}")]
    ZoneCheck(String),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BifrostError {
    /// Build a validation error that names the offending record
    pub fn invalid_record(name: &str, rtype: impl std::fmt::Display, source: ValidationError) -> Self {
        BifrostError::Validation {
            record: format!("{} {}", name, rtype),
            source,
        }
    }
}

impl From<std::io::Error> for BifrostError {
    fn from(err: std::io::Error) -> Self {
        BifrostError::Io(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, BifrostError>;
