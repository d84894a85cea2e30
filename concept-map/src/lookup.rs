//! Read-side lookups over a built concept map
//!
//! Forward lookups consult the map first and only fall back to a live
//! ICD-11 search on a miss. A token the service rejects is refreshed and the
//! search repeated once; a second rejection drops the token so the next
//! lookup acquires a new one. Reverse lookups are local-only. No lookup ever
//! returns an error: failures degrade to an empty answer.

use crate::catalog::ConceptCatalog;
use crate::model::{key_term, ConceptMap, ReverseEntry, ReverseIndex, SourceConcept, TargetEntry};
use crate::store::build_reverse_index;
use icd_service::{ClassificationSearch, CredentialManager, FailureKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a forward answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Map,
    #[serde(rename = "flexisearch")]
    FlexiSearch,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardLookup {
    pub source: Provenance,
    pub matches: Vec<TargetEntry>,
}

impl ForwardLookup {
    fn none() -> Self {
        Self {
            source: Provenance::None,
            matches: Vec::new(),
        }
    }
}

/// Catalog entry offered as an autocomplete suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub code: String,
    pub key: String,
    pub definition: Option<String>,
}

impl From<&SourceConcept> for Suggestion {
    fn from(concept: &SourceConcept) -> Self {
        Self {
            code: concept.code.clone(),
            key: concept.key(),
            definition: concept.definition.clone(),
        }
    }
}

/// Live search used when the map has no entry.
pub struct RemoteFallback {
    search: Arc<dyn ClassificationSearch>,
    credentials: Arc<CredentialManager>,
}

impl RemoteFallback {
    pub fn new(search: Arc<dyn ClassificationSearch>, credentials: Arc<CredentialManager>) -> Self {
        Self {
            search,
            credentials,
        }
    }

    /// One search; a rejected token is refreshed and the search repeated once.
    async fn search(&self, term: &str) -> Vec<TargetEntry> {
        let mut retried = false;

        loop {
            let credential = match self.credentials.current() {
                Some(credential) => credential,
                None => {
                    if !self.credentials.refresh().await {
                        warn!(term = %term, "No ICD API token for fallback search");
                        return Vec::new();
                    }
                    match self.credentials.current() {
                        Some(credential) => credential,
                        None => return Vec::new(),
                    }
                }
            };

            let error = match self.search.search(term, &credential.token).await {
                Ok(matches) => {
                    return matches
                        .into_iter()
                        .map(|m| TargetEntry::related(m.code, m.title))
                        .collect();
                }
                Err(error) => error,
            };

            let kind = error.kind();
            if kind == FailureKind::Unauthorized {
                if retried {
                    // rejected again right after a refresh
                    self.credentials.invalidate(credential.generation);
                } else {
                    retried = true;
                    info!(term = %term, "Fallback token rejected, triggering refresh");
                    if self.credentials.refresh_from(credential.generation).await {
                        continue;
                    }
                }
            }

            warn!(term = %term, kind = %kind, "Fallback search failed: {}", error);
            return Vec::new();
        }
    }
}

/// Immutable lookup indexes; safe to share across any number of callers.
pub struct LookupService {
    map: ConceptMap,
    reverse: ReverseIndex,
    catalog: ConceptCatalog,
    fallback: Option<RemoteFallback>,
}

impl LookupService {
    /// Build the service, deriving the reverse index from `map` and `catalog`.
    pub fn new(map: ConceptMap, catalog: ConceptCatalog, fallback: Option<RemoteFallback>) -> Self {
        let reverse = build_reverse_index(&map, &catalog);
        Self {
            map,
            reverse,
            catalog,
            fallback,
        }
    }

    pub fn concept_map(&self) -> &ConceptMap {
        &self.map
    }

    pub fn reverse_index(&self) -> &ReverseIndex {
        &self.reverse
    }

    /// Targets for a composite key, from the map or a live search.
    pub async fn forward_lookup(&self, source_key: &str) -> ForwardLookup {
        if let Some(element) = self.map.get(source_key) {
            return ForwardLookup {
                source: Provenance::Map,
                matches: element.targets.clone(),
            };
        }

        let Some(fallback) = &self.fallback else {
            debug!(key = %source_key, "Not in concept map and no remote fallback configured");
            return ForwardLookup::none();
        };

        let term = key_term(source_key).trim();
        if term.is_empty() {
            return ForwardLookup::none();
        }

        debug!(key = %source_key, term = %term, "Not in concept map, searching remotely");
        let matches = fallback.search(term).await;
        if matches.is_empty() {
            ForwardLookup::none()
        } else {
            ForwardLookup {
                source: Provenance::FlexiSearch,
                matches,
            }
        }
    }

    /// Source concepts mapped onto `target_code`; local only.
    pub fn reverse_lookup(&self, target_code: &str) -> Vec<ReverseEntry> {
        self.reverse.get(target_code.trim()).to_vec()
    }

    /// Case-insensitive substring match on display or code, in catalog order.
    pub fn suggest(&self, query: &str, limit: usize) -> Vec<Suggestion> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        self.catalog
            .concepts()
            .iter()
            .filter(|concept| {
                concept.display.to_lowercase().contains(&needle)
                    || concept.code.to_lowercase().contains(&needle)
            })
            .take(limit)
            .map(Suggestion::from)
            .collect()
    }
}
