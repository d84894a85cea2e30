//! Concept map assembly, persistence and the derived reverse index

use crate::catalog::ConceptCatalog;
use crate::config::MapMetadataConfig;
use crate::engine::{Candidate, MappingResults};
use crate::model::{ConceptMap, MapElement, ReverseEntry, ReverseIndex};
use crate::{MapError, MapResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{error, info};

/// Run counters stored alongside the map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSummary {
    pub mapped: usize,
    pub skipped: usize,
    pub failed: usize,
    pub ineligible: usize,
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMapGroup {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub element: Vec<MapElement>,
}

/// FHIR `ConceptMap` resource as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMapDocument {
    pub resource_type: String,
    pub id: String,
    pub url: String,
    pub name: String,
    pub title: String,
    pub status: String,
    pub experimental: bool,
    pub date: DateTime<Utc>,
    pub publisher: String,
    pub description: String,
    pub source_uri: String,
    pub target_uri: String,
    #[serde(default)]
    pub summary: MapSummary,
    #[serde(default)]
    pub group: Vec<ConceptMapGroup>,
}

impl ConceptMapDocument {
    /// All elements across groups, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &MapElement> {
        self.group.iter().flat_map(|group| group.element.iter())
    }

    pub fn into_elements(self) -> impl Iterator<Item = MapElement> {
        self.group.into_iter().flat_map(|group| group.element)
    }
}

/// Order candidates by source code, ties kept in submission order.
pub fn sort_candidates(mut candidates: Vec<Candidate>) -> Vec<MapElement> {
    candidates.sort_by(|a, b| {
        a.element
            .source_code
            .cmp(&b.element.source_code)
            .then(a.submission_index.cmp(&b.submission_index))
    });
    candidates
        .into_iter()
        .map(|candidate| candidate.element)
        .filter(|element| !element.targets.is_empty())
        .collect()
}

/// Build the persisted document from a finished mapping run.
pub fn assemble(
    results: MappingResults,
    metadata: &MapMetadataConfig,
    workers: usize,
    generated_at: DateTime<Utc>,
) -> ConceptMapDocument {
    let summary = MapSummary {
        mapped: results.candidates.len(),
        skipped: results.skipped,
        failed: results.failed,
        ineligible: results.ineligible,
        workers,
    };
    let elements = sort_candidates(results.candidates);

    let description = format!(
        "A draft concept map linking NAMC codes to ICD-11 codes. Generated from {} NAMC codes \
         that had at least one match. {} codes were skipped due to no match ({} after failed \
         lookups). (Used {} workers).",
        summary.mapped,
        summary.skipped + summary.failed,
        summary.failed,
        workers
    );

    ConceptMapDocument {
        resource_type: "ConceptMap".to_string(),
        id: metadata.id.clone(),
        url: metadata.url.clone(),
        name: metadata.name.clone(),
        title: metadata.title.clone(),
        status: "draft".to_string(),
        experimental: true,
        date: generated_at,
        publisher: metadata.publisher.clone(),
        description,
        source_uri: metadata.source_uri.clone(),
        target_uri: metadata.target_uri.clone(),
        summary,
        group: vec![ConceptMapGroup {
            source: metadata.source_uri.clone(),
            target: metadata.target_uri.clone(),
            element: elements,
        }],
    }
}

/// Write the document atomically: a temporary file in the destination
/// directory is fully written, synced, then renamed over `path`.
pub fn persist(document: &ConceptMapDocument, path: &Path) -> MapResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| {
        MapError::Persistence(format!("cannot create {}: {}", parent.display(), e))
    })?;

    let body = serde_json::to_vec_pretty(document)
        .map_err(|e| MapError::Persistence(format!("cannot serialize concept map: {}", e)))?;

    let mut staged = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| MapError::Persistence(format!("cannot stage output: {}", e)))?;
    staged
        .write_all(&body)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| MapError::Persistence(format!("cannot write staged output: {}", e)))?;
    staged.persist(path).map_err(|e| {
        MapError::Persistence(format!("cannot replace {}: {}", path.display(), e.error))
    })?;

    info!(
        path = %path.display(),
        elements = document.summary.mapped,
        "Concept map saved"
    );
    Ok(())
}

/// Read a persisted document.
pub fn read_document(path: &Path) -> MapResult<ConceptMapDocument> {
    let raw = std::fs::read(path)
        .map_err(|e| MapError::Load(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&raw)
        .map_err(|e| MapError::Load(format!("invalid concept map {}: {}", path.display(), e)))
}

/// Load the forward index; a missing or corrupt file yields an empty map.
pub fn load_concept_map(path: &Path) -> ConceptMap {
    match read_document(path) {
        Ok(document) => {
            let map = ConceptMap::from_elements(document.into_elements());
            info!(path = %path.display(), elements = map.len(), "Concept map loaded");
            map
        }
        Err(e) => {
            error!("Concept map unavailable, every lookup will fall back to remote search: {}", e);
            ConceptMap::default()
        }
    }
}

/// Derive the reverse index from the forward map.
///
/// Elements are scanned in map order; definitions come from the catalog
/// concept with the same `(system, display)`.
pub fn build_reverse_index(map: &ConceptMap, catalog: &ConceptCatalog) -> ReverseIndex {
    let concepts = catalog.by_key();
    let mut index = ReverseIndex::default();

    for element in map.elements() {
        let definition = concepts
            .get(&element.source_key)
            .and_then(|concept| concept.definition.clone());

        for target in &element.targets {
            index.push(
                &target.code,
                ReverseEntry {
                    source_code: element.source_code.clone(),
                    source_key: element.source_key.clone(),
                    definition: definition.clone(),
                },
            );
        }
    }

    index
}
