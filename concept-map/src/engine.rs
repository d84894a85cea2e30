//! Concurrent NAMC → ICD-11 mapping
//!
//! One job per source concept is spawned onto the runtime; a semaphore bounds
//! how many run at once. Every job shares the same [`CredentialManager`] and
//! ends in exactly one [`JobOutcome`]. A failing (or panicking) job never
//! affects its siblings.
//!
//! Retry policy per job:
//! - missing token: refresh (joining any refresh in flight) before searching
//! - `Unauthorized`: one refresh, then one more search
//! - `RateLimited`: sleep for the backoff interval, then one more search
//! - `Transient`: no retry
//!
//! A job gets a single retry in total; any failure after it is terminal.

use crate::model::{MapElement, SourceConcept, TargetEntry};
use futures::FutureExt;
use icd_service::{ClassificationSearch, CredentialManager, FailureKind, SearchMatch};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed per job after the first search
    pub max_retries: u32,
    /// Sleep before retrying a rate-limited search
    pub rate_limit_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            rate_limit_backoff: Duration::from_secs(10),
        }
    }
}

/// Terminal result of one mapping job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// At least one target was found
    Mapped(MapElement),
    /// The search succeeded with nothing usable
    NoMatches,
    /// The job gave up; the concept is dropped
    Failed(FailureKind),
}

/// A mapped concept tagged with its submission position.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub submission_index: usize,
    pub element: MapElement,
}

#[derive(Debug, Clone, Default)]
pub struct MappingResults {
    pub candidates: Vec<Candidate>,
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub ineligible: usize,
}

impl MappingResults {
    pub fn mapped(&self) -> usize {
        self.candidates.len()
    }
}

/// Build the map element for a concept from cleaned search hits.
///
/// Targets keep the search order; repeated codes keep their first title.
pub fn build_element(concept: &SourceConcept, matches: &[SearchMatch]) -> Option<MapElement> {
    let mut seen = HashSet::new();
    let targets: Vec<TargetEntry> = matches
        .iter()
        .filter(|m| !m.code.is_empty() && !m.title.is_empty())
        .filter(|m| seen.insert(m.code.clone()))
        .map(|m| TargetEntry::related(m.code.clone(), m.title.clone()))
        .collect();

    if targets.is_empty() {
        return None;
    }

    Some(MapElement {
        source_code: concept.code.clone(),
        source_key: concept.key(),
        targets,
    })
}

/// Run the lookup for one concept under the retry policy.
pub async fn map_concept(
    concept: &SourceConcept,
    search: &dyn ClassificationSearch,
    credentials: &CredentialManager,
    policy: &RetryPolicy,
) -> JobOutcome {
    let term = concept.display.as_str();
    let mut retries = 0u32;

    loop {
        let credential = match credentials.current() {
            Some(credential) => credential,
            None => {
                debug!(term = %term, "No token available, waiting for refresh");
                if !credentials.refresh().await {
                    return JobOutcome::Failed(FailureKind::Unauthorized);
                }
                match credentials.current() {
                    Some(credential) => credential,
                    None => return JobOutcome::Failed(FailureKind::Unauthorized),
                }
            }
        };

        let error = match search.search(term, &credential.token).await {
            Ok(matches) => {
                return match build_element(concept, &matches) {
                    Some(element) => JobOutcome::Mapped(element),
                    None => JobOutcome::NoMatches,
                };
            }
            Err(error) => error,
        };

        let kind = error.kind();
        if retries >= policy.max_retries || kind == FailureKind::Transient {
            if kind == FailureKind::Unauthorized && retries > 0 {
                // rejected again right after a refresh
                credentials.invalidate(credential.generation);
            }
            warn!(term = %term, kind = %kind, "Search failed: {}", error);
            return JobOutcome::Failed(kind);
        }
        retries += 1;

        match kind {
            FailureKind::Unauthorized => {
                info!(term = %term, "Token rejected, triggering refresh");
                if !credentials.refresh_from(credential.generation).await {
                    return JobOutcome::Failed(FailureKind::Unauthorized);
                }
            }
            FailureKind::RateLimited => {
                warn!(
                    term = %term,
                    backoff_secs = policy.rate_limit_backoff.as_secs_f64(),
                    "Rate limited, backing off"
                );
                tokio::time::sleep(policy.rate_limit_backoff).await;
            }
            FailureKind::Transient => return JobOutcome::Failed(kind),
        }
    }
}

/// Fans concept lookups out over a bounded pool of workers.
pub struct MappingEngine {
    search: Arc<dyn ClassificationSearch>,
    credentials: Arc<CredentialManager>,
    max_workers: usize,
    policy: RetryPolicy,
}

impl MappingEngine {
    pub fn new(
        search: Arc<dyn ClassificationSearch>,
        credentials: Arc<CredentialManager>,
        max_workers: usize,
    ) -> Self {
        Self {
            search,
            credentials,
            max_workers: max_workers.max(1),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Map every eligible concept and collect one outcome per job.
    ///
    /// Completion order is arbitrary; callers impose ordering afterwards
    /// using [`Candidate::submission_index`].
    pub async fn run(&self, concepts: &[SourceConcept]) -> MappingResults {
        let mut results = MappingResults::default();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut jobs = JoinSet::new();

        for concept in concepts {
            if !concept.is_mappable() {
                results.ineligible += 1;
                continue;
            }

            let submission_index = results.submitted;
            results.submitted += 1;

            let concept = concept.clone();
            let search = self.search.clone();
            let credentials = self.credentials.clone();
            let policy = self.policy.clone();
            let semaphore = semaphore.clone();

            jobs.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let job = map_concept(&concept, search.as_ref(), &credentials, &policy);
                let outcome = AssertUnwindSafe(job)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        error!(code = %concept.code, "Mapping job panicked");
                        JobOutcome::Failed(FailureKind::Transient)
                    });
                (submission_index, concept, outcome)
            });
        }

        info!(
            submitted = results.submitted,
            workers = self.max_workers,
            "Submitted mapping jobs"
        );

        let total = results.submitted;
        let mut completed = 0usize;
        while let Some(joined) = jobs.join_next().await {
            completed += 1;
            let (submission_index, concept, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!("Mapping job aborted: {}", e);
                    results.failed += 1;
                    continue;
                }
            };

            match outcome {
                JobOutcome::Mapped(element) => {
                    info!(
                        "[{}/{}] [{}] {} - '{}': {} ICD-11 match(es)",
                        completed,
                        total,
                        concept.system,
                        concept.code,
                        concept.display,
                        element.targets.len()
                    );
                    results.candidates.push(Candidate {
                        submission_index,
                        element,
                    });
                }
                JobOutcome::NoMatches => {
                    info!(
                        "[{}/{}] [{}] {} - '{}': no ICD-11 matches, skipping",
                        completed, total, concept.system, concept.code, concept.display
                    );
                    results.skipped += 1;
                }
                JobOutcome::Failed(kind) => {
                    info!(
                        "[{}/{}] [{}] {} - '{}': lookup failed ({}), skipping",
                        completed, total, concept.system, concept.code, concept.display, kind
                    );
                    results.failed += 1;
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NamcSystem;
    use async_trait::async_trait;
    use icd_service::{IcdError, SecretString, TokenSource};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticTokens {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for StaticTokens {
        async fn fetch_token(&self) -> icd_service::Result<SecretString> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SecretString::new(format!("token-{}", n)))
        }
    }

    /// Replays scripted responses, then returns an empty result.
    struct ScriptedSearch {
        script: Mutex<VecDeque<icd_service::Result<Vec<SearchMatch>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSearch {
        fn new(script: Vec<icd_service::Result<Vec<SearchMatch>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ClassificationSearch for ScriptedSearch {
        async fn search(
            &self,
            _term: &str,
            _token: &SecretString,
        ) -> icd_service::Result<Vec<SearchMatch>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn concept() -> SourceConcept {
        SourceConcept {
            code: "AB1".to_string(),
            display: "Jaundice".to_string(),
            system: NamcSystem::Siddha,
            definition: None,
        }
    }

    fn hit(code: &str, title: &str) -> SearchMatch {
        SearchMatch {
            code: code.to_string(),
            title: title.to_string(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            rate_limit_backoff: Duration::from_millis(5),
        }
    }

    fn credentials() -> (Arc<StaticTokens>, CredentialManager) {
        let tokens = Arc::new(StaticTokens {
            calls: AtomicUsize::new(0),
        });
        (tokens.clone(), CredentialManager::new(tokens))
    }

    #[test]
    fn test_build_element_deduplicates_codes() {
        let element = build_element(
            &concept(),
            &[
                hit("ME20.1", "Jaundice"),
                hit("ME20.1", "Jaundice, other"),
                hit("KA87", "Neonatal jaundice"),
            ],
        )
        .unwrap();

        assert_eq!(element.source_key, "Siddha: Jaundice");
        let codes: Vec<&str> = element.targets.iter().map(|t| t.code.as_str()).collect();
        assert_eq!(codes, vec!["ME20.1", "KA87"]);
        assert_eq!(element.targets[0].display, "Jaundice");
    }

    #[test]
    fn test_build_element_without_targets_is_dropped() {
        assert!(build_element(&concept(), &[]).is_none());
    }

    #[tokio::test]
    async fn test_acquires_token_when_missing() {
        let (tokens, credentials) = credentials();
        let search = ScriptedSearch::new(vec![Ok(vec![hit("ME20.1", "Jaundice")])]);

        let outcome = map_concept(&concept(), &search, &credentials, &fast_policy()).await;

        assert!(matches!(outcome, JobOutcome::Mapped(_)));
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once_then_retries() {
        let (tokens, credentials) = credentials();
        let search = ScriptedSearch::new(vec![
            Err(IcdError::Unauthorized),
            Ok(vec![hit("ME20.1", "Jaundice")]),
        ]);

        let outcome = map_concept(&concept(), &search, &credentials, &fast_policy()).await;

        assert!(matches!(outcome, JobOutcome::Mapped(_)));
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
        // initial acquisition plus one refresh
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_terminal() {
        let (tokens, credentials) = credentials();
        let search = ScriptedSearch::new(vec![
            Err(IcdError::Unauthorized),
            Err(IcdError::Unauthorized),
            Ok(vec![hit("ME20.1", "Jaundice")]),
        ]);

        let outcome = map_concept(&concept(), &search, &credentials, &fast_policy()).await;

        assert_eq!(outcome, JobOutcome::Failed(FailureKind::Unauthorized));
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 2);
        // the twice-rejected token is dropped for everyone
        assert!(credentials.current_token().is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_retries_once() {
        let (_, credentials) = credentials();
        let search = ScriptedSearch::new(vec![
            Err(IcdError::RateLimited),
            Ok(vec![hit("ME20.1", "Jaundice")]),
        ]);

        let outcome = map_concept(&concept(), &search, &credentials, &fast_policy()).await;

        assert!(matches!(outcome, JobOutcome::Mapped(_)));
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_rate_limit_is_terminal() {
        let (_, credentials) = credentials();
        let search = ScriptedSearch::new(vec![
            Err(IcdError::RateLimited),
            Err(IcdError::RateLimited),
            Ok(vec![hit("ME20.1", "Jaundice")]),
        ]);

        let outcome = map_concept(&concept(), &search, &credentials, &fast_policy()).await;

        assert_eq!(outcome, JobOutcome::Failed(FailureKind::RateLimited));
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_is_shared_across_failure_kinds() {
        let (_, credentials) = credentials();
        let search = ScriptedSearch::new(vec![
            Err(IcdError::RateLimited),
            Err(IcdError::Unauthorized),
            Ok(vec![hit("ME20.1", "Jaundice")]),
        ]);

        let outcome = map_concept(&concept(), &search, &credentials, &fast_policy()).await;

        assert_eq!(outcome, JobOutcome::Failed(FailureKind::Unauthorized));
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_is_not_retried() {
        let (_, credentials) = credentials();
        let search = ScriptedSearch::new(vec![
            Err(IcdError::Transient("connection reset".to_string())),
            Ok(vec![hit("ME20.1", "Jaundice")]),
        ]);

        let outcome = map_concept(&concept(), &search, &credentials, &fast_policy()).await;

        assert_eq!(outcome, JobOutcome::Failed(FailureKind::Transient));
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_no_matches() {
        let (_, credentials) = credentials();
        let search = ScriptedSearch::new(vec![Ok(Vec::new())]);

        let outcome = map_concept(&concept(), &search, &credentials, &fast_policy()).await;
        assert_eq!(outcome, JobOutcome::NoMatches);
    }
}
