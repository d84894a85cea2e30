//! Error types for the concept map pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Load error: {0}")]
    Load(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<config::ConfigError> for MapError {
    fn from(err: config::ConfigError) -> Self {
        MapError::Configuration(err.to_string())
    }
}

impl From<icd_service::IcdError> for MapError {
    fn from(err: icd_service::IcdError) -> Self {
        match err {
            icd_service::IcdError::Configuration(msg) => MapError::Configuration(msg),
            other => MapError::Credential(other.to_string()),
        }
    }
}

pub type MapResult<T> = Result<T, MapError>;
