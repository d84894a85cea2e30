//! # ICD-11 Service
//!
//! Client for the WHO ICD-11 API used by the concept-map pipeline.
//!
//! ## Features:
//! - OAuth2 client-credentials token acquisition
//! - One shared bearer credential with single-flight refresh
//! - MMS term search with markup-free titles
//! - Failure classification (unauthorized, rate-limited, transient)
//!
//! Retrying is left to callers; see [`FailureKind`].

pub mod config;
pub mod credentials;
pub mod error;
pub mod search;

pub use config::IcdApiConfig;
pub use credentials::{
    ClientCredentialsTokenSource, Credential, CredentialManager, TokenSource,
};
pub use error::*;
pub use search::{clean_title, ClassificationSearch, IcdSearchClient, SearchMatch};

/// Bearer token type shared across the workspace.
pub use secrecy::{ExposeSecret, SecretString};
