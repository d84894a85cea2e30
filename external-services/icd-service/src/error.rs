//! Error types for the ICD-11 service

use thiserror::Error;

/// How a failed remote call should be treated by a caller's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The bearer credential was rejected (HTTP 401).
    Unauthorized,
    /// The remote service is throttling requests (HTTP 429).
    RateLimited,
    /// Network, status or decoding failure.
    Transient,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::RateLimited => "rate-limited",
            FailureKind::Transient => "transient",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum IcdError {
    #[error("Unauthorized: bearer token rejected")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl IcdError {
    /// Classify this error for the retry policy.
    ///
    /// Credential and configuration failures surface as `Unauthorized`:
    /// from a caller's point of view no usable token exists.
    pub fn kind(&self) -> FailureKind {
        match self {
            IcdError::Unauthorized | IcdError::Credential(_) | IcdError::Configuration(_) => {
                FailureKind::Unauthorized
            }
            IcdError::RateLimited => FailureKind::RateLimited,
            IcdError::Transient(_) => FailureKind::Transient,
        }
    }
}

impl From<reqwest::Error> for IcdError {
    fn from(err: reqwest::Error) -> Self {
        IcdError::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for IcdError {
    fn from(err: serde_json::Error) -> Self {
        IcdError::Transient(format!("invalid response body: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, IcdError>;
