//! NAMC vocabulary loading
//!
//! Each vocabulary is a JSON document of the form
//! `{"concept": [{"code", "display", "designation": [{"value"}]}]}`.
//! Missing or malformed files are skipped with a warning; loading never fails.

use crate::config::SourceFile;
use crate::model::{composite_key, NamcSystem, SourceConcept};
use crate::MapError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct VocabularyDocument {
    #[serde(default)]
    concept: Vec<ConceptRecord>,
}

#[derive(Debug, Deserialize)]
struct ConceptRecord {
    code: Option<String>,
    display: Option<String>,
    designation: Option<Vec<Designation>>,
}

#[derive(Debug, Deserialize)]
struct Designation {
    value: Option<String>,
}

impl ConceptRecord {
    fn into_concept(self, system: NamcSystem) -> SourceConcept {
        let definition = self
            .designation
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|designation| designation.value);

        SourceConcept {
            code: self.code.unwrap_or_default(),
            display: self.display.unwrap_or_default(),
            system,
            definition,
        }
    }
}

/// Ordered, read-only collection of source concepts from all vocabularies.
#[derive(Debug, Clone, Default)]
pub struct ConceptCatalog {
    concepts: Vec<SourceConcept>,
}

impl ConceptCatalog {
    pub fn new(concepts: Vec<SourceConcept>) -> Self {
        Self { concepts }
    }

    /// Load every source in order; file order, then in-file order.
    pub fn load(sources: &[SourceFile]) -> Self {
        let mut concepts = Vec::new();

        for source in sources {
            match read_vocabulary(source.system, &source.path) {
                Ok(loaded) => {
                    info!(
                        system = %source.system,
                        path = %source.path.display(),
                        count = loaded.len(),
                        "Loaded NAMC concepts"
                    );
                    concepts.extend(loaded);
                }
                Err(e) => {
                    warn!(
                        system = %source.system,
                        path = %source.path.display(),
                        "Skipping vocabulary: {}",
                        e
                    );
                }
            }
        }

        info!(total = concepts.len(), "NAMC catalog loaded");
        Self { concepts }
    }

    pub fn concepts(&self) -> &[SourceConcept] {
        &self.concepts
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Concepts indexed by composite key; the first concept wins on collision.
    pub fn by_key(&self) -> HashMap<String, &SourceConcept> {
        let mut index = HashMap::with_capacity(self.concepts.len());
        for concept in &self.concepts {
            index
                .entry(composite_key(concept.system, &concept.display))
                .or_insert(concept);
        }
        index
    }
}

fn read_vocabulary(system: NamcSystem, path: &Path) -> Result<Vec<SourceConcept>, MapError> {
    let raw = std::fs::read(path)
        .map_err(|e| MapError::Load(format!("cannot read {}: {}", path.display(), e)))?;
    let document: VocabularyDocument = serde_json::from_slice(&raw)
        .map_err(|e| MapError::Load(format!("invalid JSON in {}: {}", path.display(), e)))?;

    Ok(document
        .concept
        .into_iter()
        .map(|record| record.into_concept(system))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_tags_system_and_keeps_order() {
        let dir = TempDir::new().unwrap();
        let siddha = write_file(
            &dir,
            "siddha.json",
            r#"{"concept": [
                {"code": "AB1", "display": "Jaundice", "designation": [{"value": "Yellow discolouration"}]},
                {"code": "AB2", "display": "Fever"}
            ]}"#,
        );
        let unani = write_file(
            &dir,
            "unani.json",
            r#"{"concept": [{"code": "U1", "display": "Jaundice", "designation": []}]}"#,
        );

        let catalog = ConceptCatalog::load(&[
            SourceFile::new(NamcSystem::Siddha, siddha),
            SourceFile::new(NamcSystem::Unani, unani),
        ]);

        let codes: Vec<&str> = catalog.concepts().iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["AB1", "AB2", "U1"]);

        let first = &catalog.concepts()[0];
        assert_eq!(first.system, NamcSystem::Siddha);
        assert_eq!(first.definition.as_deref(), Some("Yellow discolouration"));
        assert_eq!(catalog.concepts()[2].system, NamcSystem::Unani);
        assert_eq!(catalog.concepts()[2].definition, None);
    }

    #[test]
    fn test_missing_and_malformed_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let broken = write_file(&dir, "broken.json", "{ this is not json");
        let good = write_file(
            &dir,
            "ayurveda.json",
            r#"{"concept": [{"code": "AY1", "display": "Jvara"}]}"#,
        );

        let catalog = ConceptCatalog::load(&[
            SourceFile::new(NamcSystem::Siddha, dir.path().join("missing.json")),
            SourceFile::new(NamcSystem::Unani, broken),
            SourceFile::new(NamcSystem::Ayurveda, good),
        ]);

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.concepts()[0].key(), "Ayurveda: Jvara");
    }

    #[test]
    fn test_no_cross_file_deduplication() {
        let dir = TempDir::new().unwrap();
        let body = r#"{"concept": [{"code": "X1", "display": "Kamalai"}]}"#;
        let a = write_file(&dir, "a.json", body);
        let b = write_file(&dir, "b.json", body);

        let catalog = ConceptCatalog::load(&[
            SourceFile::new(NamcSystem::Siddha, a),
            SourceFile::new(NamcSystem::Siddha, b),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.by_key().len(), 1);
    }

    #[test]
    fn test_document_without_concepts_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.json", r#"{"resourceType": "CodeSystem"}"#);

        let catalog = ConceptCatalog::load(&[SourceFile::new(NamcSystem::Unani, path)]);
        assert!(catalog.is_empty());
    }
}
