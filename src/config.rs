use crate::models::{DataSource, DataSourceKind};
use crate::retry::RetryPolicy;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// When false the scheduler runs without arming timers.
    pub enabled: bool,
    pub auto_start: bool,
    pub ingestion_interval_ms: u64,
    pub enrichment_interval_ms: u64,
    pub refresh_interval_ms: u64,
    pub enrichment_batch_size: usize,
    pub enrichment_concurrency: usize,
    pub stale_data_threshold_days: i64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_cooldown_ms: u64,
    pub sources: Vec<DataSource>,
    pub regions: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_start: false,
            ingestion_interval_ms: 24 * 60 * 60 * 1000,
            enrichment_interval_ms: 60 * 60 * 1000,
            refresh_interval_ms: 6 * 60 * 60 * 1000,
            enrichment_batch_size: 50,
            enrichment_concurrency: 5,
            stale_data_threshold_days: 7,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            circuit_failure_threshold: 5,
            circuit_cooldown_ms: 30_000,
            sources: vec![DataSource {
                id: "ucc-database".to_string(),
                name: "UCC filings database".to_string(),
                kind: DataSourceKind::Database,
                endpoint: None,
                credential: None,
                rate_limit_per_minute: 60,
            }],
            regions: vec!["CA".to_string(), "NY".to_string(), "TX".to_string()],
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Pipeline enabled: {}, auto start: {}",
            config.enabled,
            config.auto_start
        );
        tracing::debug!(
            "Intervals (ms): ingestion={}, enrichment={}, refresh={}",
            config.ingestion_interval_ms,
            config.enrichment_interval_ms,
            config.refresh_interval_ms
        );
        for source in &config.sources {
            // Credentials are never logged
            tracing::debug!(
                "Data source {} ({:?}) limit {}/min",
                source.id,
                source.kind,
                source.rate_limit_per_minute
            );
        }
        tracing::debug!("Regions: {}", config.regions.join(","));

        Ok(config)
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let sources = match (var("FILING_SOURCES"), var("FILING_SOURCES_PATH")) {
            (Some(json), _) => parse_sources(&json)?,
            (None, Some(path)) => {
                let json = std::fs::read_to_string(&path).map_err(|e| {
                    anyhow::anyhow!("FILING_SOURCES_PATH {} could not be read: {}", path, e)
                })?;
                parse_sources(&json)?
            }
            (None, None) => defaults.sources,
        };

        let regions = match var("INGESTION_REGIONS") {
            Some(list) => list
                .split(',')
                .map(|r| r.trim().to_uppercase())
                .filter(|r| !r.is_empty())
                .collect(),
            None => defaults.regions,
        };

        let config = Self {
            enabled: parse_bool(var("PIPELINE_ENABLED"), "PIPELINE_ENABLED", defaults.enabled)?,
            auto_start: parse_bool(
                var("PIPELINE_AUTO_START"),
                "PIPELINE_AUTO_START",
                defaults.auto_start,
            )?,
            ingestion_interval_ms: parse_num(
                var("INGESTION_INTERVAL_MS"),
                "INGESTION_INTERVAL_MS",
                defaults.ingestion_interval_ms,
            )?,
            enrichment_interval_ms: parse_num(
                var("ENRICHMENT_INTERVAL_MS"),
                "ENRICHMENT_INTERVAL_MS",
                defaults.enrichment_interval_ms,
            )?,
            refresh_interval_ms: parse_num(
                var("REFRESH_INTERVAL_MS"),
                "REFRESH_INTERVAL_MS",
                defaults.refresh_interval_ms,
            )?,
            enrichment_batch_size: parse_num(
                var("ENRICHMENT_BATCH_SIZE"),
                "ENRICHMENT_BATCH_SIZE",
                defaults.enrichment_batch_size,
            )?,
            enrichment_concurrency: parse_num(
                var("ENRICHMENT_CONCURRENCY"),
                "ENRICHMENT_CONCURRENCY",
                defaults.enrichment_concurrency,
            )?,
            stale_data_threshold_days: parse_num(
                var("STALE_DATA_THRESHOLD_DAYS"),
                "STALE_DATA_THRESHOLD_DAYS",
                defaults.stale_data_threshold_days,
            )?,
            retry_attempts: parse_num(
                var("RETRY_ATTEMPTS"),
                "RETRY_ATTEMPTS",
                defaults.retry_attempts,
            )?,
            retry_delay_ms: parse_num(
                var("RETRY_DELAY_MS"),
                "RETRY_DELAY_MS",
                defaults.retry_delay_ms,
            )?,
            max_retry_delay_ms: parse_num(
                var("MAX_RETRY_DELAY_MS"),
                "MAX_RETRY_DELAY_MS",
                defaults.max_retry_delay_ms,
            )?,
            circuit_failure_threshold: parse_num(
                var("CIRCUIT_FAILURE_THRESHOLD"),
                "CIRCUIT_FAILURE_THRESHOLD",
                defaults.circuit_failure_threshold,
            )?,
            circuit_cooldown_ms: parse_num(
                var("CIRCUIT_COOLDOWN_MS"),
                "CIRCUIT_COOLDOWN_MS",
                defaults.circuit_cooldown_ms,
            )?,
            sources,
            regions,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("INGESTION_INTERVAL_MS", self.ingestion_interval_ms),
            ("ENRICHMENT_INTERVAL_MS", self.enrichment_interval_ms),
            ("REFRESH_INTERVAL_MS", self.refresh_interval_ms),
            ("RETRY_DELAY_MS", self.retry_delay_ms),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }
        if self.max_retry_delay_ms < self.retry_delay_ms {
            anyhow::bail!("MAX_RETRY_DELAY_MS cannot be lower than RETRY_DELAY_MS");
        }
        if self.enrichment_batch_size == 0 {
            anyhow::bail!("ENRICHMENT_BATCH_SIZE must be greater than 0");
        }
        if self.enrichment_concurrency == 0 {
            anyhow::bail!("ENRICHMENT_CONCURRENCY must be greater than 0");
        }
        if self.stale_data_threshold_days < 0 {
            anyhow::bail!("STALE_DATA_THRESHOLD_DAYS cannot be negative");
        }
        if self.retry_attempts == 0 {
            anyhow::bail!("RETRY_ATTEMPTS must be at least 1");
        }
        if self.circuit_failure_threshold == 0 {
            anyhow::bail!("CIRCUIT_FAILURE_THRESHOLD must be at least 1");
        }
        if self.regions.is_empty() {
            anyhow::bail!("INGESTION_REGIONS cannot be empty");
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                anyhow::bail!("Data source id cannot be empty");
            }
            if !seen.insert(source.id.as_str()) {
                anyhow::bail!("Duplicate data source id: {}", source.id);
            }
            if source.rate_limit_per_minute == 0 {
                anyhow::bail!("Data source {} must allow at least 1 call per minute", source.id);
            }
            if matches!(source.kind, DataSourceKind::Api | DataSourceKind::StatePortal) {
                let endpoint = source.endpoint.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("Data source {} requires an endpoint", source.id)
                })?;
                let url = url::Url::parse(endpoint).map_err(|e| {
                    anyhow::anyhow!("Data source {} endpoint is not a valid URL: {}", source.id, e)
                })?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    anyhow::bail!(
                        "Data source {} endpoint must start with http:// or https://",
                        source.id
                    );
                }
            }
        }

        Ok(())
    }

    pub fn ingestion_interval(&self) -> Duration {
        Duration::from_millis(self.ingestion_interval_ms)
    }

    pub fn enrichment_interval(&self) -> Duration {
        Duration::from_millis(self.enrichment_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_cooldown_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
            Duration::from_millis(self.max_retry_delay_ms),
        )
    }
}

fn parse_sources(json: &str) -> anyhow::Result<Vec<DataSource>> {
    serde_json::from_str(json)
        .map_err(|e| anyhow::anyhow!("FILING_SOURCES is not a valid source list: {}", e))
}

fn parse_bool(value: Option<String>, name: &str, default: bool) -> anyhow::Result<bool> {
    match value.as_deref().map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be true or false", name),
        },
    }
}

fn parse_num<T: std::str::FromStr>(value: Option<String>, name: &str, default: T) -> anyhow::Result<T> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", name)),
    }
}
