//! Configuration for the ICD-11 API

use crate::{IcdError, Result};
use secrecy::SecretString;
use std::time::Duration;

pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://icdaccessmanagement.who.int/connect/token";
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://id.who.int/icd/release/11/2024-01/mms/search";

#[derive(Debug, Clone)]
pub struct IcdApiConfig {
    /// OAuth2 token endpoint (client-credentials grant)
    pub token_endpoint: String,

    /// MMS search endpoint, queried with `?q=<term>`
    pub search_endpoint: String,

    pub client_id: String,

    /// Never logged or serialized
    pub client_secret: SecretString,

    pub scope: String,

    /// Upper bound on every outbound request
    pub request_timeout_secs: u64,

    /// Cap on matches returned per search
    pub max_results: usize,

    pub language: String,
    pub api_version: String,
}

impl IcdApiConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            scope: "icdapi_access".to_string(),
            request_timeout_secs: 10,
            max_results: 20,
            language: "en".to_string(),
            api_version: "v2".to_string(),
        }
    }

    /// Load API configuration from environment variables.
    ///
    /// `ICD_CLIENT_ID` and `ICD_CLIENT_SECRET` are required; the endpoints
    /// fall back to the public WHO services.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("ICD_CLIENT_ID")
            .map_err(|_| IcdError::Configuration("ICD_CLIENT_ID is not set".to_string()))?;
        let client_secret = std::env::var("ICD_CLIENT_SECRET")
            .map_err(|_| IcdError::Configuration("ICD_CLIENT_SECRET is not set".to_string()))?;

        let mut config = Self::new(client_id, client_secret);

        if let Ok(endpoint) = std::env::var("ICD_TOKEN_ENDPOINT") {
            config.token_endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("ICD_SEARCH_ENDPOINT") {
            config.search_endpoint = endpoint;
        }
        if let Some(secs) = std::env::var("ICD_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.request_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_endpoints(
        mut self,
        token_endpoint: impl Into<String>,
        search_endpoint: impl Into<String>,
    ) -> Self {
        self.token_endpoint = token_endpoint.into();
        self.search_endpoint = search_endpoint.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(IcdError::Configuration("client_id must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(IcdError::Configuration(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(IcdError::Configuration("max_results must be positive".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Shared HTTP client honouring the configured timeout.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .build()
            .map_err(|e| IcdError::Configuration(format!("failed to build HTTP client: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IcdApiConfig::new("client", "secret");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_results, 20);
        assert_eq!(config.scope, "icdapi_access");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = IcdApiConfig::new("client", "super-secret-value");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret-value"));
    }

    #[test]
    fn test_validation_rejects_empty_client() {
        let config = IcdApiConfig::new("  ", "secret");
        assert!(matches!(config.validate(), Err(IcdError::Configuration(_))));
    }
}
