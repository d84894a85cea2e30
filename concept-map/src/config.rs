//! Configuration for the concept map pipeline
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML/YAML/JSON file, then `NAMC_MAP__*` environment variables
//! (e.g. `NAMC_MAP__MAX_WORKERS=4`).

use crate::model::NamcSystem;
use crate::{MapError, MapResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One vocabulary document and the system it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub system: NamcSystem,
    pub path: PathBuf,
}

impl SourceFile {
    pub fn new(system: NamcSystem, path: impl Into<PathBuf>) -> Self {
        Self {
            system,
            path: path.into(),
        }
    }
}

/// Identity of the generated FHIR ConceptMap resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapMetadataConfig {
    pub id: String,
    pub url: String,
    pub name: String,
    pub title: String,
    pub publisher: String,
    pub source_uri: String,
    pub target_uri: String,
}

impl Default for MapMetadataConfig {
    fn default() -> Self {
        Self {
            id: "namc-to-icd11".to_string(),
            url: "http://example.org/fhir/ConceptMap/namc-to-icd11".to_string(),
            name: "NAMC_to_ICD11_ConceptMap".to_string(),
            title: "NAMC (Ayurveda, Siddha, Unani) to ICD-11 ConceptMap".to_string(),
            publisher: "NAMC Mapping Project".to_string(),
            source_uri: "https://ndhm.gov.in/fhir/CodeSystem/namc".to_string(),
            target_uri: "http://id.who.int/icd11/mms".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Vocabularies, loaded in this order
    pub sources: Vec<SourceFile>,

    /// Where the built concept map is written and read back from
    pub output_path: PathBuf,

    /// Concurrent lookup workers
    pub max_workers: usize,

    /// Pause before the single retry after a rate-limit response
    pub rate_limit_backoff_secs: u64,

    /// Process only the first N catalog entries
    pub test_limit: Option<usize>,

    pub metadata: MapMetadataConfig,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceFile::new(NamcSystem::Siddha, "Data/SiddhaJson.json"),
                SourceFile::new(NamcSystem::Ayurveda, "Data/AyurvedaJson.json"),
                SourceFile::new(NamcSystem::Unani, "Data/UnaniJson.json"),
            ],
            output_path: PathBuf::from("Data/NAMC_to_ICD11_ConceptMap.json"),
            max_workers: 8,
            rate_limit_backoff_secs: 10,
            test_limit: None,
            metadata: MapMetadataConfig::default(),
        }
    }
}

impl MapperConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> MapResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(MapError::Configuration(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("NAMC_MAP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: MapperConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MapResult<()> {
        if self.max_workers == 0 {
            return Err(MapError::Configuration(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.sources.is_empty() {
            return Err(MapError::Configuration(
                "at least one vocabulary source is required".to_string(),
            ));
        }
        if self.test_limit == Some(0) {
            return Err(MapError::Configuration(
                "test_limit must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }
}
