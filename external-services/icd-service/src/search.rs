//! ICD-11 MMS term search

use crate::{IcdApiConfig, IcdError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

lazy_static! {
    static ref MARKUP: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// One cleaned classification hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub code: String,
    pub title: String,
}

/// Forward term search against the target classification.
///
/// Implementations issue exactly one outbound query per call and never retry.
#[async_trait]
pub trait ClassificationSearch: Send + Sync {
    async fn search(&self, term: &str, token: &SecretString) -> Result<Vec<SearchMatch>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "destinationEntities", default)]
    destination_entities: Vec<DestinationEntity>,
}

#[derive(Debug, Deserialize)]
struct DestinationEntity {
    title: Option<String>,
    #[serde(rename = "theCode")]
    the_code: Option<String>,
}

/// Strip embedded highlight markup (`<em class='found'>`, `<b>`) from a title.
pub fn clean_title(title: &str) -> String {
    MARKUP.replace_all(title, "").trim().to_string()
}

/// HTTP client for `GET {search_endpoint}?q=<term>`.
pub struct IcdSearchClient {
    client: reqwest::Client,
    config: IcdApiConfig,
}

impl IcdSearchClient {
    pub fn new(config: IcdApiConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    pub fn with_client(client: reqwest::Client, config: IcdApiConfig) -> Self {
        Self { client, config }
    }

    fn collect_matches(&self, body: SearchResponse) -> Vec<SearchMatch> {
        body.destination_entities
            .into_iter()
            .filter_map(|entity| {
                let code = entity.the_code.filter(|code| !code.is_empty())?;
                let title = entity.title.map(|title| clean_title(&title))?;
                (!title.is_empty()).then_some(SearchMatch { code, title })
            })
            .take(self.config.max_results)
            .collect()
    }
}

#[async_trait]
impl ClassificationSearch for IcdSearchClient {
    async fn search(&self, term: &str, token: &SecretString) -> Result<Vec<SearchMatch>> {
        let response = self
            .client
            .get(&self.config.search_endpoint)
            .query(&[("q", term)])
            .bearer_auth(token.expose_secret())
            .header("Accept", "application/json")
            .header("Accept-Language", self.config.language.as_str())
            .header("API-Version", self.config.api_version.as_str())
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(IcdError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => return Err(IcdError::RateLimited),
            status if !status.is_success() => {
                return Err(IcdError::Transient(format!(
                    "search for '{}' returned {}",
                    term, status
                )))
            }
            _ => {}
        }

        let bytes = response.bytes().await?;
        let body: SearchResponse = serde_json::from_slice(&bytes)?;
        let matches = self.collect_matches(body);
        debug!(term = %term, matches = matches.len(), "ICD search complete");
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title_strips_markup() {
        assert_eq!(clean_title("<b>Jaundice</b>"), "Jaundice");
        assert_eq!(
            clean_title("Neonatal <em class='found'>jaundice</em> NOS"),
            "Neonatal jaundice NOS"
        );
        assert_eq!(clean_title("Plain title"), "Plain title");
    }

    #[test]
    fn test_collect_matches_filters_and_caps() {
        let mut config = IcdApiConfig::new("client", "secret");
        config.max_results = 2;
        let client = IcdSearchClient::with_client(reqwest::Client::new(), config);

        let body: SearchResponse = serde_json::from_str(
            r#"{"destinationEntities": [
                {"title": "<b>A</b>", "theCode": "1A00"},
                {"title": "No code", "theCode": null},
                {"title": "", "theCode": "1A01"},
                {"title": "B", "theCode": "1A02"},
                {"title": "C", "theCode": "1A03"}
            ]}"#,
        )
        .unwrap();

        let matches = client.collect_matches(body);
        assert_eq!(
            matches,
            vec![
                SearchMatch { code: "1A00".into(), title: "A".into() },
                SearchMatch { code: "1A02".into(), title: "B".into() },
            ]
        );
    }

    #[test]
    fn test_missing_entities_is_empty() {
        let body: SearchResponse = serde_json::from_str(r#"{"error": false}"#).unwrap();
        assert!(body.destination_entities.is_empty());
    }
}
