//! Source concepts, map elements and the read-side indexes

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Separator between system and display in a composite key.
pub const KEY_SEPARATOR: &str = ": ";

/// The three NAMC vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamcSystem {
    Siddha,
    Ayurveda,
    Unani,
}

impl NamcSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamcSystem::Siddha => "Siddha",
            NamcSystem::Ayurveda => "Ayurveda",
            NamcSystem::Unani => "Unani",
        }
    }
}

impl fmt::Display for NamcSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamcSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "siddha" => Ok(NamcSystem::Siddha),
            "ayurveda" => Ok(NamcSystem::Ayurveda),
            "unani" => Ok(NamcSystem::Unani),
            other => Err(format!("unknown NAMC system: {}", other)),
        }
    }
}

/// Build the `"{system}: {display}"` lookup key.
pub fn composite_key(system: NamcSystem, display: &str) -> String {
    format!("{}{}{}", system, KEY_SEPARATOR, display)
}

/// The term portion of a composite key (everything after the first separator).
pub fn key_term(key: &str) -> &str {
    key.split_once(KEY_SEPARATOR)
        .map(|(_, term)| term)
        .unwrap_or(key)
}

/// One entry from a local vocabulary; immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConcept {
    pub code: String,
    pub display: String,
    pub system: NamcSystem,
    pub definition: Option<String>,
}

impl SourceConcept {
    pub fn key(&self) -> String {
        composite_key(self.system, &self.display)
    }

    /// Whether the concept carries enough to be searched for.
    pub fn is_mappable(&self) -> bool {
        !self.code.trim().is_empty() && !self.display.trim().is_empty()
    }
}

/// FHIR R4 ConceptMap equivalence of a discovered target.
///
/// Automated search never asserts more than relatedness, so `relatedto` is
/// the only code this map writes or accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Equivalence {
    #[default]
    RelatedTo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub code: String,
    pub display: String,
    #[serde(default)]
    pub equivalence: Equivalence,
}

impl TargetEntry {
    pub fn related(code: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display: display.into(),
            equivalence: Equivalence::RelatedTo,
        }
    }
}

/// The persisted unit: one source concept and its discovered targets.
///
/// Serialised in FHIR `ConceptMap.group.element` shape, where `code` is the
/// source code and `display` carries the composite key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapElement {
    #[serde(rename = "code")]
    pub source_code: String,
    #[serde(rename = "display")]
    pub source_key: String,
    #[serde(rename = "target", default)]
    pub targets: Vec<TargetEntry>,
}

/// Forward index: composite key to map element, in document order.
#[derive(Debug, Clone, Default)]
pub struct ConceptMap {
    elements: Vec<MapElement>,
    by_key: HashMap<String, usize>,
}

impl ConceptMap {
    /// Index `elements`; the first element wins when a key repeats.
    /// Elements without targets are not indexed.
    pub fn from_elements(elements: impl IntoIterator<Item = MapElement>) -> Self {
        let mut map = Self::default();
        for element in elements {
            if element.targets.is_empty() || map.by_key.contains_key(&element.source_key) {
                tracing::warn!(
                    key = %element.source_key,
                    "Ignoring empty or duplicate concept map element"
                );
                continue;
            }
            map.by_key
                .insert(element.source_key.clone(), map.elements.len());
            map.elements.push(element);
        }
        map
    }

    pub fn get(&self, source_key: &str) -> Option<&MapElement> {
        self.by_key
            .get(source_key)
            .and_then(|index| self.elements.get(*index))
    }

    pub fn contains_key(&self, source_key: &str) -> bool {
        self.by_key.contains_key(source_key)
    }

    pub fn elements(&self) -> &[MapElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn stats(&self) -> MapStats {
        let mut codes = HashSet::new();
        let mut targets = 0;
        for element in &self.elements {
            targets += element.targets.len();
            codes.extend(element.targets.iter().map(|t| t.code.as_str()));
        }
        MapStats {
            elements: self.elements.len(),
            targets,
            distinct_targets: codes.len(),
        }
    }
}

/// Size of a loaded concept map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapStats {
    pub elements: usize,
    pub targets: usize,
    pub distinct_targets: usize,
}

/// One source concept that maps to a given classification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseEntry {
    pub source_code: String,
    pub source_key: String,
    pub definition: Option<String>,
}

/// Classification code to every source concept mapped onto it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseIndex {
    entries: HashMap<String, Vec<ReverseEntry>>,
}

impl ReverseIndex {
    pub(crate) fn push(&mut self, target_code: &str, entry: ReverseEntry) {
        let bucket = self.entries.entry(target_code.to_string()).or_default();
        if !bucket.iter().any(|existing| existing.source_key == entry.source_key) {
            bucket.push(entry);
        }
    }

    pub fn get(&self, target_code: &str) -> &[ReverseEntry] {
        self.entries
            .get(target_code)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct classification codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_stats() {
        let map = ConceptMap::from_elements(vec![
            MapElement {
                source_code: "AB1".to_string(),
                source_key: "Siddha: Jaundice".to_string(),
                targets: vec![
                    TargetEntry::related("ME20.1", "Jaundice"),
                    TargetEntry::related("KA87", "Neonatal jaundice"),
                ],
            },
            MapElement {
                source_code: "SR12".to_string(),
                source_key: "Siddha: Kamalai".to_string(),
                targets: vec![TargetEntry::related("ME20.1", "Jaundice")],
            },
        ]);

        assert_eq!(
            map.stats(),
            MapStats {
                elements: 2,
                targets: 3,
                distinct_targets: 2,
            }
        );
        assert_eq!(ConceptMap::default().stats(), MapStats::default());
    }

    #[test]
    fn test_composite_key_and_term() {
        let key = composite_key(NamcSystem::Siddha, "Jaundice");
        assert_eq!(key, "Siddha: Jaundice");
        assert_eq!(key_term(&key), "Jaundice");
        assert_eq!(key_term("Unani: Su-e-Mizaj: Har"), "Su-e-Mizaj: Har");
        assert_eq!(key_term("no separator"), "no separator");
    }

    #[test]
    fn test_system_parsing() {
        assert_eq!("siddha".parse::<NamcSystem>().unwrap(), NamcSystem::Siddha);
        assert_eq!(" Unani ".parse::<NamcSystem>().unwrap(), NamcSystem::Unani);
        assert!("Homeopathy".parse::<NamcSystem>().is_err());
    }

    #[test]
    fn test_map_element_serializes_in_fhir_shape() {
        let element = MapElement {
            source_code: "AB1".to_string(),
            source_key: "Siddha: Jaundice".to_string(),
            targets: vec![TargetEntry::related("ME20.1", "Jaundice")],
        };

        let value = serde_json::to_value(&element).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "code": "AB1",
                "display": "Siddha: Jaundice",
                "target": [{"code": "ME20.1", "display": "Jaundice", "equivalence": "relatedto"}]
            })
        );
    }

    #[test]
    fn test_target_equivalence_defaults_to_related() {
        let target: TargetEntry =
            serde_json::from_str(r#"{"code": "ME20.1", "display": "Jaundice"}"#).unwrap();
        assert_eq!(target.equivalence, Equivalence::RelatedTo);

        let asserted = serde_json::from_str::<TargetEntry>(
            r#"{"code": "ME20.1", "display": "Jaundice", "equivalence": "equivalent"}"#,
        );
        assert!(asserted.is_err());
    }

    #[test]
    fn test_concept_map_keeps_first_duplicate_and_drops_empty() {
        let first = MapElement {
            source_code: "A1".to_string(),
            source_key: "Siddha: Fever".to_string(),
            targets: vec![TargetEntry::related("MG26", "Fever")],
        };
        let duplicate = MapElement {
            source_code: "A2".to_string(),
            ..first.clone()
        };
        let empty = MapElement {
            source_code: "A3".to_string(),
            source_key: "Unani: Nothing".to_string(),
            targets: Vec::new(),
        };

        let map = ConceptMap::from_elements(vec![first.clone(), duplicate, empty]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Siddha: Fever"), Some(&first));
        assert!(!map.contains_key("Unani: Nothing"));
    }

    #[test]
    fn test_reverse_index_unknown_code_is_empty() {
        let index = ReverseIndex::default();
        assert!(index.get("ME20.1").is_empty());
        assert!(index.is_empty());
    }
}
