//! End-to-end concept map build

use crate::catalog::ConceptCatalog;
use crate::config::MapperConfig;
use crate::engine::{MappingEngine, RetryPolicy};
use crate::store::{assemble, persist};
use crate::{MapError, MapResult};
use chrono::Utc;
use icd_service::{ClassificationSearch, CredentialManager};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Outcome of a successful build, reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub submitted: usize,
    pub mapped: usize,
    pub skipped: usize,
    pub failed: usize,
    pub ineligible: usize,
    pub output_path: PathBuf,
}

/// Builds and persists the NAMC → ICD-11 concept map.
pub struct MapBuilder {
    config: MapperConfig,
    search: Arc<dyn ClassificationSearch>,
    credentials: Arc<CredentialManager>,
}

impl MapBuilder {
    pub fn new(
        config: MapperConfig,
        search: Arc<dyn ClassificationSearch>,
        credentials: Arc<CredentialManager>,
    ) -> Self {
        Self {
            config,
            search,
            credentials,
        }
    }

    /// Load the configured vocabularies and build from them.
    pub async fn build(&self) -> MapResult<BuildReport> {
        let catalog = ConceptCatalog::load(&self.config.sources);
        self.build_from(&catalog).await
    }

    /// Map `catalog`, then write the result.
    ///
    /// Fails only when no initial token can be acquired or the output
    /// cannot be written; per-concept failures just drop that concept.
    pub async fn build_from(&self, catalog: &ConceptCatalog) -> MapResult<BuildReport> {
        if catalog.is_empty() {
            return Err(MapError::Load(
                "no NAMC concepts loaded, check the configured sources".to_string(),
            ));
        }

        let concepts = match self.config.test_limit {
            Some(limit) => &catalog.concepts()[..limit.min(catalog.len())],
            None => catalog.concepts(),
        };
        info!(
            total = concepts.len(),
            limit = ?self.config.test_limit,
            workers = self.config.max_workers,
            "Starting NAMC → ICD-11 mapping"
        );

        if !self.credentials.refresh().await {
            return Err(MapError::Credential(
                "failed to acquire initial ICD API token".to_string(),
            ));
        }

        let engine = MappingEngine::new(
            self.search.clone(),
            self.credentials.clone(),
            self.config.max_workers,
        )
        .with_policy(RetryPolicy {
            max_retries: 1,
            rate_limit_backoff: self.config.rate_limit_backoff(),
        });

        let results = engine.run(concepts).await;
        let report = BuildReport {
            submitted: results.submitted,
            mapped: results.mapped(),
            skipped: results.skipped,
            failed: results.failed,
            ineligible: results.ineligible,
            output_path: self.config.output_path.clone(),
        };

        info!("Mapping complete, assembling concept map");
        let document = assemble(
            results,
            &self.config.metadata,
            engine.max_workers(),
            Utc::now(),
        );
        persist(&document, &self.config.output_path)?;

        info!(
            mapped = report.mapped,
            skipped = report.skipped,
            failed = report.failed,
            "Concept map build finished"
        );
        Ok(report)
    }
}
