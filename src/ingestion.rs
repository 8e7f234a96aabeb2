use crate::circuit_breaker::{CircuitBreakers, CircuitState};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::models::*;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sources::SourceClients;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tokio::time::Instant;

/// Pulls filings from every configured source and normalizes them.
///
/// Every (source, region) pair goes through the same path: rate-limiter slot,
/// circuit-breaker gate, retried fetch, normalization, dedup. A failing pair
/// only affects its own [`IngestionRunResult`].
pub struct IngestionService {
    sources: Vec<DataSource>,
    regions: Vec<String>,
    clients: SourceClients,
    rate_limiter: RateLimiter,
    breakers: CircuitBreakers,
    retry: RetryPolicy,
}

impl IngestionService {
    /// Creates a service with default resilience settings.
    pub fn new(sources: Vec<DataSource>, regions: Vec<String>, clients: SourceClients) -> Self {
        Self {
            sources,
            regions,
            clients,
            rate_limiter: RateLimiter::new(),
            breakers: CircuitBreakers::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Creates a service with the default client for each configured source.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let clients = SourceClients::from_sources(&config.sources)?;
        Ok(Self::with_clients(config, clients))
    }

    /// Creates a service from configuration, using the given clients.
    pub fn with_clients(config: &PipelineConfig, clients: SourceClients) -> Self {
        Self::new(config.sources.clone(), config.regions.clone(), clients)
            .with_retry_policy(config.retry_policy())
            .with_circuit_breakers(CircuitBreakers::new(
                config.circuit_failure_threshold,
                config.circuit_cooldown(),
            ))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breakers(mut self, breakers: CircuitBreakers) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn sources(&self) -> &[DataSource] {
        &self.sources
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn circuit_state(&self, source_id: &str) -> Option<CircuitState> {
        self.breakers.state(source_id)
    }

    /// Ingests every (source × region) pair.
    ///
    /// Sources run concurrently; regions of one source run in order so the
    /// source's rate limit and breaker see a sequential stream. Never fails:
    /// each pair reports its own success flag and errors.
    ///
    /// # Arguments
    ///
    /// * `regions` - Regions to fetch. `None` or empty uses the configured list.
    pub async fn ingest(&self, regions: Option<&[String]>) -> Vec<IngestionRunResult> {
        let regions = match regions {
            Some(r) if !r.is_empty() => r,
            _ => self.regions.as_slice(),
        };

        tracing::info!(
            "Starting ingestion: {} source(s) × {} region(s)",
            self.sources.len(),
            regions.len()
        );

        let per_source = self.sources.iter().map(|source| async move {
            let mut results = Vec::with_capacity(regions.len());
            for region in regions {
                results.push(self.ingest_pair(source, region).await);
            }
            results
        });

        let results: Vec<IngestionRunResult> = futures::future::join_all(per_source)
            .await
            .into_iter()
            .flatten()
            .collect();

        let stats = Self::get_statistics(&results);
        tracing::info!(
            "Ingestion complete: {} records, {:.0}% of {} runs succeeded, {} error(s)",
            stats.total_records,
            stats.success_rate,
            results.len(),
            stats.error_count
        );

        results
    }

    async fn ingest_pair(&self, source: &DataSource, region: &str) -> IngestionRunResult {
        let started = Instant::now();
        let label = format!("{}/{}", source.id, region);
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        let Some(client) = self.clients.get(&source.id) else {
            tracing::warn!("No client registered for source {}", source.id);
            return IngestionRunResult::new(
                false,
                Vec::new(),
                vec![format!("No client registered for source {}", source.id)],
                &source.id,
                region,
                elapsed_ms(),
            );
        };

        self.rate_limiter
            .acquire(&source.id, source.rate_limit_per_minute)
            .await;

        let breaker = self.breakers.for_source(&source.id);
        if let Err(e) = breaker.allow() {
            tracing::warn!("Skipping {}: {}", label, e);
            return IngestionRunResult::new(
                false,
                Vec::new(),
                vec![e.to_string()],
                &source.id,
                region,
                elapsed_ms(),
            );
        }

        let client = &client;
        let outcome = self
            .retry
            .run(&label, move |_| client.fetch(source, region))
            .await;

        match outcome {
            Ok(raw) => {
                breaker.record_success();
                let (filings, errors) = normalize_batch(raw, region);
                tracing::info!(
                    "✓ {}: {} filing(s), {} skipped record(s)",
                    label,
                    filings.len(),
                    errors.len()
                );
                IngestionRunResult::new(true, filings, errors, &source.id, region, elapsed_ms())
            }
            Err(e) => {
                // A malformed body still means the source answered
                if matches!(e.last, PipelineError::Validation(_)) {
                    breaker.record_success();
                } else {
                    breaker.record_failure();
                }
                tracing::warn!("✗ {} failed: {}", label, e.last);
                IngestionRunResult::new(
                    false,
                    Vec::new(),
                    e.attempts,
                    &source.id,
                    region,
                    elapsed_ms(),
                )
            }
        }
    }

    /// Lapsed filings no older than `max_age_days`, across all sources.
    pub async fn find_lapsed_filings(&self, max_age_days: i64) -> Vec<NormalizedFiling> {
        let results = self.ingest(None).await;
        let today = Utc::now().date_naive();
        let mut seen = HashSet::new();

        results
            .into_iter()
            .flat_map(|r| r.filings)
            .filter(|f| f.status == FilingStatus::Lapsed)
            .filter(|f| (today - f.filing_date).num_days() <= max_age_days)
            .filter(|f| seen.insert(f.id.clone()))
            .collect()
    }

    /// Aggregates a set of results. All zeros for an empty slice.
    pub fn get_statistics(results: &[IngestionRunResult]) -> IngestionStatistics {
        if results.is_empty() {
            return IngestionStatistics::default();
        }

        let total = results.len() as f64;
        let successes = results.iter().filter(|r| r.success).count() as f64;
        let total_time: u64 = results.iter().map(|r| r.metadata.processing_time_ms).sum();

        IngestionStatistics {
            total_records: results.iter().map(|r| r.metadata.record_count).sum(),
            success_rate: successes / total * 100.0,
            avg_processing_time: total_time as f64 / total,
            error_count: results.iter().map(|r| r.errors.len()).sum(),
        }
    }
}

// ============ Normalization ============

/// Normalizes a fetched batch, dropping invalid records and duplicate ids.
///
/// Returns the filings and one error message per skipped invalid record.
pub fn normalize_batch(raw: Vec<RawFiling>, region: &str) -> (Vec<NormalizedFiling>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut filings = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();

    for record in raw {
        match normalize_filing(record, region) {
            Ok(filing) => {
                if seen.insert(filing.id.clone()) {
                    filings.push(filing);
                } else {
                    tracing::debug!("Dropping duplicate filing {}", filing.id);
                }
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    (filings, errors)
}

/// Converts one provider record into a [`NormalizedFiling`].
pub fn normalize_filing(raw: RawFiling, region: &str) -> Result<NormalizedFiling, PipelineError> {
    let debtor_name = non_empty(raw.debtor_name).ok_or_else(|| {
        PipelineError::Validation(format!(
            "Filing {} has no debtor name",
            raw.id.as_deref().unwrap_or("<unknown>")
        ))
    })?;

    let date_text = non_empty(raw.filing_date).ok_or_else(|| {
        PipelineError::Validation(format!("Filing for {} has no filing date", debtor_name))
    })?;
    let filing_date = parse_filing_date(&date_text).ok_or_else(|| {
        PipelineError::Validation(format!(
            "Filing for {} has unparseable date '{}'",
            debtor_name, date_text
        ))
    })?;

    let jurisdiction = non_empty(raw.jurisdiction)
        .or_else(|| non_empty(Some(region.to_string())))
        .ok_or_else(|| {
            PipelineError::Validation(format!("Filing for {} has no jurisdiction", debtor_name))
        })?
        .to_ascii_uppercase();

    let secured_party_name =
        non_empty(raw.secured_party_name).unwrap_or_else(|| "Unknown".to_string());

    let id = non_empty(raw.id).unwrap_or_else(|| {
        derive_filing_id(&jurisdiction, &debtor_name, &secured_party_name, filing_date)
    });

    Ok(NormalizedFiling {
        id,
        filing_date,
        status: raw
            .status
            .as_deref()
            .map(FilingStatus::parse)
            .unwrap_or(FilingStatus::Active),
        filing_type: non_empty(raw.filing_type).unwrap_or_else(|| "UCC-1".to_string()),
        lien_amount: raw.lien_amount.as_ref().and_then(parse_amount),
        debtor_name,
        secured_party_name,
        jurisdiction,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` and `MM/DD/YYYY`.
pub fn parse_filing_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

/// Parses numeric or currency-formatted amounts. Negative values are dropped.
pub fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | ' '))
                .collect();
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    (amount.is_finite() && amount >= 0.0).then_some(amount)
}

/// Deterministic id for records that arrive without one.
fn derive_filing_id(
    jurisdiction: &str,
    debtor: &str,
    secured_party: &str,
    filing_date: NaiveDate,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{}|{}|{}|{}",
            jurisdiction,
            debtor.to_lowercase(),
            secured_party.to_lowercase(),
            filing_date
        )
        .as_bytes(),
    );
    let digest = hex::encode(hasher.finalize());
    format!("gen-{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(id: Option<&str>, debtor: Option<&str>, date: Option<&str>) -> RawFiling {
        RawFiling {
            id: id.map(String::from),
            debtor_name: debtor.map(String::from),
            filing_date: date.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let filing = normalize_filing(raw(Some("F-1"), Some("  Acme LLC "), Some("2021-05-04")), "ca")
            .unwrap();

        assert_eq!(filing.id, "F-1");
        assert_eq!(filing.debtor_name, "Acme LLC");
        assert_eq!(filing.jurisdiction, "CA");
        assert_eq!(filing.secured_party_name, "Unknown");
        assert_eq!(filing.status, FilingStatus::Active);
        assert_eq!(filing.filing_type, "UCC-1");
        assert_eq!(filing.lien_amount, None);
    }

    #[test]
    fn test_normalize_rejects_missing_fields() {
        assert!(matches!(
            normalize_filing(raw(Some("F-1"), None, Some("2021-05-04")), "CA"),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            normalize_filing(raw(Some("F-1"), Some("Acme"), Some("yesterday")), "CA"),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            normalize_filing(raw(Some("F-1"), Some("Acme"), Some("2021-05-04")), " "),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_generated_ids_are_stable() {
        let a = normalize_filing(raw(None, Some("Acme"), Some("2021-05-04")), "CA").unwrap();
        let b = normalize_filing(raw(None, Some("ACME"), Some("05/04/2021")), "CA").unwrap();
        assert!(a.id.starts_with("gen-"));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2020, 2, 29);
        assert_eq!(parse_filing_date("2020-02-29"), expected);
        assert_eq!(parse_filing_date("02/29/2020"), expected);
        assert_eq!(parse_filing_date("2020-02-29T10:00:00Z"), expected);
        assert_eq!(parse_filing_date("2020-02-29T10:00:00"), expected);
        assert_eq!(parse_filing_date("29.02.2020"), None);
    }

    #[test]
    fn test_amount_parsing() {
        assert_eq!(parse_amount(&json!(1500)), Some(1500.0));
        assert_eq!(parse_amount(&json!("$1,250,000.50")), Some(1_250_000.5));
        assert_eq!(parse_amount(&json!("-5")), None);
        assert_eq!(parse_amount(&json!("n/a")), None);
        assert_eq!(parse_amount(&json!(null)), None);
    }

    #[test]
    fn test_batch_dedup_and_errors() {
        let batch = vec![
            raw(Some("F-1"), Some("Acme"), Some("2021-05-04")),
            raw(Some("F-1"), Some("Acme"), Some("2021-05-04")),
            raw(Some("F-2"), None, Some("2021-05-04")),
            raw(Some("F-3"), Some("Beta Corp"), Some("2020-01-01")),
        ];

        let (filings, errors) = normalize_batch(batch, "TX");
        assert_eq!(filings.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("F-2"));
    }

    #[test]
    fn test_statistics_on_empty_input() {
        let stats = IngestionService::get_statistics(&[]);
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.avg_processing_time, 0.0);
        assert_eq!(stats.error_count, 0);
    }

    #[test]
    fn test_statistics_aggregate() {
        let filing = normalize_filing(raw(Some("F-1"), Some("Acme"), Some("2021-05-04")), "CA")
            .unwrap();
        let results = vec![
            IngestionRunResult::new(true, vec![filing], vec![], "a", "CA", 10),
            IngestionRunResult::new(false, vec![], vec!["x".into(), "y".into()], "b", "CA", 30),
        ];

        let stats = IngestionService::get_statistics(&results);
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.avg_processing_time, 20.0);
        assert_eq!(stats.error_count, 2);
    }
}
