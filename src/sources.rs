//! Filing source clients.
//!
//! One client per [`DataSourceKind`]: a JSON API client, a secretary-of-state
//! portal scraper, and an in-memory store standing in for the filing
//! database. Clients return provider-shaped [`RawFiling`]s; normalization is
//! the ingestion layer's job.

use crate::errors::PipelineError;
use crate::models::{DataSource, DataSourceKind, RawFiling};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

/// Fetches raw filings for one region from one upstream source.
#[async_trait]
pub trait FilingSource: Send + Sync {
    async fn fetch(&self, source: &DataSource, region: &str)
        -> Result<Vec<RawFiling>, PipelineError>;

    fn name(&self) -> &'static str;
}

fn build_http_client() -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))
}

fn require_endpoint(source: &DataSource) -> Result<&str, PipelineError> {
    source
        .endpoint
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| PipelineError::Config(format!("Source {} has no endpoint", source.id)))
}

/// Reads the body of a non-success response into a classified error.
async fn status_error(response: reqwest::Response) -> PipelineError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    PipelineError::from_status(status.as_u16(), error_text)
}

// ============ JSON API ============

/// Client for sources exposing `GET {endpoint}/filings?region=XX`.
#[derive(Clone)]
pub struct ApiFilingClient {
    client: reqwest::Client,
}

impl ApiFilingClient {
    pub fn new() -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    /// Accepts a bare array or an envelope keyed by `filings`, `data` or `results`.
    pub fn parse_body(body: Value) -> Result<Vec<RawFiling>, PipelineError> {
        let records = match body {
            Value::Array(items) => Value::Array(items),
            Value::Object(mut map) => ["filings", "data", "results"]
                .iter()
                .find_map(|key| map.remove(*key))
                .ok_or_else(|| {
                    PipelineError::Validation("Response has no filings array".to_string())
                })?,
            other => {
                return Err(PipelineError::Validation(format!(
                    "Unexpected response shape: {}",
                    other
                )))
            }
        };

        serde_json::from_value(records)
            .map_err(|e| PipelineError::Validation(format!("Failed to parse filings: {}", e)))
    }
}

#[async_trait]
impl FilingSource for ApiFilingClient {
    async fn fetch(
        &self,
        source: &DataSource,
        region: &str,
    ) -> Result<Vec<RawFiling>, PipelineError> {
        let endpoint = require_endpoint(source)?;
        let url = reqwest::Url::parse_with_params(
            &format!("{}/filings", endpoint.trim_end_matches('/')),
            &[("region", region)],
        )
        .map_err(|e| PipelineError::Config(format!("Failed to build URL: {}", e)))?;

        tracing::debug!("Fetching filings from {} for region {}", source.id, region);

        let mut request = self.client.get(url);
        if let Some(ref token) = source.credential {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Validation(format!("Malformed response body from {}: {}", source.id, e))
        })?;
        Self::parse_body(body)
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

// ============ State Portal ============

fn row_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("row pattern"))
}

fn cell_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("cell pattern"))
}

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("tag pattern"))
}

fn clean_cell(raw: &str) -> Option<String> {
    let text = tag_pattern()
        .replace_all(raw, "")
        .replace("&amp;", "&")
        .replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&quot;", "\"");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Scrapes filing search result tables from state portals.
///
/// Expected column order: filing number, debtor, secured party, filing date,
/// status, filing type, amount. Rows with fewer than four data cells (headers,
/// pagination) are ignored.
#[derive(Clone)]
pub struct PortalScraper {
    client: reqwest::Client,
}

impl PortalScraper {
    pub fn new() -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    pub fn parse_html(html: &str, region: &str) -> Vec<RawFiling> {
        row_pattern()
            .captures_iter(html)
            .filter_map(|row| {
                let cells: Vec<Option<String>> = cell_pattern()
                    .captures_iter(&row[1])
                    .map(|cell| clean_cell(&cell[1]))
                    .collect();
                if cells.len() < 4 {
                    return None;
                }
                let cell = |i: usize| cells.get(i).cloned().flatten();
                Some(RawFiling {
                    id: cell(0),
                    debtor_name: cell(1),
                    secured_party_name: cell(2),
                    filing_date: cell(3),
                    status: cell(4),
                    filing_type: cell(5),
                    lien_amount: cell(6).map(Value::String),
                    jurisdiction: Some(region.to_string()),
                })
            })
            .collect()
    }
}

#[async_trait]
impl FilingSource for PortalScraper {
    async fn fetch(
        &self,
        source: &DataSource,
        region: &str,
    ) -> Result<Vec<RawFiling>, PipelineError> {
        let endpoint = require_endpoint(source)?;
        let url = reqwest::Url::parse_with_params(endpoint, &[("region", region)])
            .map_err(|e| PipelineError::Config(format!("Failed to build URL: {}", e)))?;

        tracing::debug!("Scraping portal {} for region {}", source.id, region);

        let mut request = self.client.get(url);
        if let Some(ref token) = source.credential {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let html = response.text().await?;
        Ok(Self::parse_html(&html, region))
    }

    fn name(&self) -> &'static str {
        "state-portal"
    }
}

// ============ Filing Store ============

/// In-memory filing store keyed by region, used for `database` sources.
///
/// The persistence layer loads filings into it; ingestion reads them back as
/// raw records.
#[derive(Default)]
pub struct InMemoryFilingStore {
    by_region: RwLock<HashMap<String, Vec<RawFiling>>>,
}

impl InMemoryFilingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, region: &str, filings: Vec<RawFiling>) {
        let mut by_region = self.by_region.write().unwrap_or_else(PoisonError::into_inner);
        by_region
            .entry(region.to_ascii_uppercase())
            .or_default()
            .extend(filings);
    }

    pub fn len(&self) -> usize {
        let by_region = self.by_region.read().unwrap_or_else(PoisonError::into_inner);
        by_region.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FilingSource for InMemoryFilingStore {
    async fn fetch(
        &self,
        _source: &DataSource,
        region: &str,
    ) -> Result<Vec<RawFiling>, PipelineError> {
        let by_region = self.by_region.read().unwrap_or_else(PoisonError::into_inner);
        Ok(by_region
            .get(&region.to_ascii_uppercase())
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "database"
    }
}

// ============ Registry ============

/// Maps each configured source id to the client that serves it.
#[derive(Clone, Default)]
pub struct SourceClients {
    clients: HashMap<String, Arc<dyn FilingSource>>,
    store: Arc<InMemoryFilingStore>,
}

impl SourceClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the default client for every source according to its kind.
    pub fn from_sources(sources: &[DataSource]) -> Result<Self, PipelineError> {
        let mut clients = Self::new();
        let api: Arc<dyn FilingSource> = Arc::new(ApiFilingClient::new()?);
        let portal: Arc<dyn FilingSource> = Arc::new(PortalScraper::new()?);

        for source in sources {
            let client = match source.kind {
                DataSourceKind::Api => api.clone(),
                DataSourceKind::StatePortal => portal.clone(),
                DataSourceKind::Database => clients.store.clone() as Arc<dyn FilingSource>,
            };
            clients.clients.insert(source.id.clone(), client);
        }

        Ok(clients)
    }

    /// Registers or replaces the client for `source_id`.
    pub fn with_client(mut self, source_id: &str, client: Arc<dyn FilingSource>) -> Self {
        self.clients.insert(source_id.to_string(), client);
        self
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<dyn FilingSource>> {
        self.clients.get(source_id).cloned()
    }

    /// Backing store shared by all `database` sources.
    pub fn store(&self) -> Arc<InMemoryFilingStore> {
        self.store.clone()
    }
}
