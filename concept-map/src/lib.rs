//! NAMC → ICD-11 concept map
//!
//! Builds and serves a cross-reference between the NAMC traditional-medicine
//! vocabularies (Siddha, Ayurveda, Unani) and ICD-11, where no authoritative
//! joint table exists.
//!
//! # Flow
//!
//! - **Catalog**: load the three vocabularies into one ordered list
//! - **Engine**: search ICD-11 for every concept on a bounded worker pool,
//!   sharing one refreshed credential
//! - **Store**: sort, wrap in a FHIR `ConceptMap` and write atomically
//! - **Lookup**: forward (with remote fallback) and reverse queries
//!
//! # Example
//!
//! ```rust,no_run
//! use concept_map::{MapBuilder, MapperConfig};
//! use icd_service::{
//!     ClientCredentialsTokenSource, CredentialManager, IcdApiConfig, IcdSearchClient,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = IcdApiConfig::from_env()?;
//!     let credentials = Arc::new(CredentialManager::new(Arc::new(
//!         ClientCredentialsTokenSource::new(api.clone())?,
//!     )));
//!     let search = Arc::new(IcdSearchClient::new(api)?);
//!
//!     let report = MapBuilder::new(MapperConfig::load(None)?, search, credentials)
//!         .build()
//!         .await?;
//!     println!("mapped {} concepts", report.mapped);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod lookup;
pub mod model;
pub mod pipeline;
pub mod store;

pub use catalog::ConceptCatalog;
pub use config::{MapMetadataConfig, MapperConfig, SourceFile};
pub use engine::{JobOutcome, MappingEngine, MappingResults, RetryPolicy};
pub use error::{MapError, MapResult};
pub use lookup::{ForwardLookup, LookupService, Provenance, RemoteFallback, Suggestion};
pub use model::*;
pub use pipeline::{BuildReport, MapBuilder};
pub use store::{build_reverse_index, load_concept_map, ConceptMapDocument};
