//! Shared bearer credential with single-flight refresh
//!
//! Every worker reads the token through [`CredentialManager::current`]. When a
//! worker finds the token missing or rejected it calls `refresh`; concurrent
//! callers are coalesced so that one invalidation costs exactly one request
//! to the token endpoint. Waiters observe the outcome of the refresh they
//! joined instead of issuing their own.

use crate::{IcdApiConfig, IcdError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Source of fresh bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<SecretString>;
}

/// OAuth2 client-credentials grant against the ICD access management endpoint.
pub struct ClientCredentialsTokenSource {
    client: reqwest::Client,
    config: IcdApiConfig,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

impl ClientCredentialsTokenSource {
    pub fn new(config: IcdApiConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    pub fn with_client(client: reqwest::Client, config: IcdApiConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl TokenSource for ClientCredentialsTokenSource {
    async fn fetch_token(&self) -> Result<SecretString> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("scope", self.config.scope.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .client
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| IcdError::Credential(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IcdError::Credential(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| IcdError::Credential(format!("invalid token response: {}", e)))?;

        match body.access_token {
            Some(token) if !token.is_empty() => Ok(SecretString::new(token)),
            _ => Err(IcdError::Credential(
                "access_token missing from token response".to_string(),
            )),
        }
    }
}

/// A token together with the refresh generation that produced it.
#[derive(Clone)]
pub struct Credential {
    pub token: SecretString,
    pub generation: u64,
}

#[derive(Default)]
struct CredentialState {
    token: Option<SecretString>,
    generation: u64,
}

/// Process-wide holder of the current bearer token.
pub struct CredentialManager {
    source: Arc<dyn TokenSource>,
    state: RwLock<CredentialState>,
    refresh_lock: Mutex<()>,
}

impl CredentialManager {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            state: RwLock::new(CredentialState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// The live token, if any.
    pub fn current_token(&self) -> Option<SecretString> {
        self.state.read().token.clone()
    }

    /// The live token and its generation, read atomically.
    pub fn current(&self) -> Option<Credential> {
        let state = self.state.read();
        state.token.as_ref().map(|token| Credential {
            token: token.clone(),
            generation: state.generation,
        })
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Refresh the token, joining any refresh already in flight.
    ///
    /// Returns `true` when a token is installed afterwards.
    pub async fn refresh(&self) -> bool {
        let observed = self.generation();
        self.refresh_from(observed).await
    }

    /// Refresh a token that was observed at `observed_generation`.
    ///
    /// If another caller completed a refresh since that generation was
    /// observed, its outcome is returned without contacting the token
    /// endpoint again.
    pub async fn refresh_from(&self, observed_generation: u64) -> bool {
        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.state.read();
            if state.generation != observed_generation {
                debug!(
                    generation = state.generation,
                    "Joined completed credential refresh"
                );
                return state.token.is_some();
            }
        }

        info!("Acquiring new ICD API token");
        let fetched = self.source.fetch_token().await;

        let mut state = self.state.write();
        state.generation += 1;
        match fetched {
            Ok(token) => {
                state.token = Some(token);
                info!(generation = state.generation, "New ICD API token acquired");
                true
            }
            Err(e) => {
                state.token = None;
                warn!(generation = state.generation, "Failed to acquire ICD API token: {}", e);
                false
            }
        }
    }

    /// Drop a token confirmed to be invalid, unless it was already replaced.
    pub fn invalidate(&self, observed_generation: u64) {
        let mut state = self.state.write();
        if state.generation == observed_generation && state.token.is_some() {
            state.token = None;
            state.generation += 1;
            debug!(generation = state.generation, "ICD API token invalidated");
        }
    }
}
