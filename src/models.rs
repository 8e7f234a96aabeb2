use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============ Source Configuration ============

/// How a data source is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSourceKind {
    /// Remote JSON API.
    Api,
    /// Secretary-of-state portal that has to be scraped.
    StatePortal,
    /// Query against a filing store.
    Database,
}

/// One upstream filing provider. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    /// Stable identifier, used to key rate limits and circuit breakers.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Access method.
    pub kind: DataSourceKind,
    /// Base URL for `api` and `state-portal` sources.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub credential: Option<String>,
    /// Maximum requests per rolling minute.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
}

fn default_rate_limit() -> u32 {
    60
}

// ============ Filings ============

/// Legal state of a filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilingStatus {
    Active,
    Lapsed,
    Terminated,
}

impl FilingStatus {
    /// Maps provider status strings. Anything unrecognised is treated as active.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lapsed" | "expired" => FilingStatus::Lapsed,
            "terminated" | "released" | "satisfied" => FilingStatus::Terminated,
            _ => FilingStatus::Active,
        }
    }
}

/// Provider-shaped filing record, before normalization.
///
/// All fields are optional: upstream sources disagree on naming and
/// completeness, so validation happens in the ingestion layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFiling {
    #[serde(default, alias = "filingNumber", alias = "filing_number", alias = "fileNumber")]
    pub id: Option<String>,
    #[serde(default, alias = "filingDate", alias = "date", alias = "filed_at")]
    pub filing_date: Option<String>,
    #[serde(default, alias = "debtorName", alias = "debtor")]
    pub debtor_name: Option<String>,
    #[serde(
        default,
        alias = "securedPartyName",
        alias = "secured_party",
        alias = "securedParty"
    )]
    pub secured_party_name: Option<String>,
    #[serde(default, alias = "state")]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "filingType", alias = "type")]
    pub filing_type: Option<String>,
    /// Number or string such as `"$125,000.00"`.
    #[serde(default, alias = "lienAmount", alias = "amount")]
    pub lien_amount: Option<Value>,
}

/// Filing in the common representation shared by every source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFiling {
    pub id: String,
    pub filing_date: NaiveDate,
    pub debtor_name: String,
    pub secured_party_name: String,
    pub jurisdiction: String,
    pub status: FilingStatus,
    pub filing_type: String,
    pub lien_amount: Option<f64>,
}

/// Metadata for one (source, region) ingestion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionMetadata {
    pub source: String,
    pub region: String,
    pub timestamp: DateTime<Utc>,
    /// Always equal to `filings.len()` of the owning result.
    pub record_count: usize,
    pub processing_time_ms: u64,
}

/// Outcome of one (source, region) attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRunResult {
    pub success: bool,
    pub filings: Vec<NormalizedFiling>,
    pub errors: Vec<String>,
    pub metadata: IngestionMetadata,
}

impl IngestionRunResult {
    /// Builds a result, deriving `record_count` from the filings.
    pub fn new(
        success: bool,
        filings: Vec<NormalizedFiling>,
        errors: Vec<String>,
        source: &str,
        region: &str,
        processing_time_ms: u64,
    ) -> Self {
        let record_count = filings.len();
        Self {
            success,
            filings,
            errors,
            metadata: IngestionMetadata {
                source: source.to_string(),
                region: region.to_string(),
                timestamp: Utc::now(),
                record_count,
                processing_time_ms,
            },
        }
    }
}

/// Aggregate view over a set of ingestion results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStatistics {
    pub total_records: usize,
    /// Percentage of successful results, 0..=100.
    pub success_rate: f64,
    pub avg_processing_time: f64,
    pub error_count: usize,
}

// ============ Enrichment ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthSignalType {
    Hiring,
    Expansion,
    Equipment,
    Permit,
    Contract,
}

impl GrowthSignalType {
    pub const ALL: [GrowthSignalType; 5] = [
        GrowthSignalType::Hiring,
        GrowthSignalType::Expansion,
        GrowthSignalType::Equipment,
        GrowthSignalType::Permit,
        GrowthSignalType::Contract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthSignalType::Hiring => "hiring",
            GrowthSignalType::Expansion => "expansion",
            GrowthSignalType::Equipment => "equipment",
            GrowthSignalType::Permit => "permit",
            GrowthSignalType::Contract => "contract",
        }
    }
}

/// Evidence that a company is growing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthSignal {
    pub id: String,
    #[serde(rename = "type")]
    pub signal_type: GrowthSignalType,
    pub description: String,
    pub detected_date: DateTime<Utc>,
    /// Strength of the signal, 0..=100.
    pub score: f64,
    /// 0..=1.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthGrade {
    A,
    B,
    C,
    D,
    F,
}

impl HealthGrade {
    /// Letter grade for an overall score.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthGrade::A
        } else if score >= 80.0 {
            HealthGrade::B
        } else if score >= 70.0 {
            HealthGrade::C
        } else if score >= 60.0 {
            HealthGrade::D
        } else {
            HealthGrade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthGrade::A => "A",
            HealthGrade::B => "B",
            HealthGrade::C => "C",
            HealthGrade::D => "D",
            HealthGrade::F => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentTrend {
    Improving,
    Stable,
    Declining,
}

impl SentimentTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentTrend::Improving => "improving",
            SentimentTrend::Stable => "stable",
            SentimentTrend::Declining => "declining",
        }
    }
}

/// Business health derived from reviews and violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthScore {
    /// 0..=100.
    pub overall: f64,
    pub grade: HealthGrade,
    pub sentiment_trend: SentimentTrend,
    pub review_count: u32,
    /// 0..=1.
    pub avg_sentiment: f64,
    pub violation_count: u32,
    pub last_updated: DateTime<Utc>,
}

impl HealthScore {
    /// Placeholder used before any health data has been gathered.
    pub fn neutral(now: DateTime<Utc>) -> Self {
        Self {
            overall: 50.0,
            grade: HealthGrade::from_score(50.0),
            sentiment_trend: SentimentTrend::Stable,
            review_count: 0,
            avg_sentiment: 0.5,
            violation_count: 0,
            last_updated: now,
        }
    }

    /// Neutral score for a prospect whose health lookup failed. Dated at the
    /// epoch so the next refresh pass picks it up.
    pub fn unscored() -> Self {
        Self::neutral(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Sales workflow state. Owned by the outer CRUD layer; enrichment only sets
/// it on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProspectStatus {
    New,
    Claimed,
    Contacted,
    Qualified,
    Unqualified,
}

/// Scored sales lead derived from one or more filings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    /// Stable across refresh passes.
    pub id: String,
    pub company_name: String,
    pub industry: String,
    pub jurisdiction: String,
    pub status: ProspectStatus,
    /// 0..=100.
    pub priority_score: f64,
    pub default_date: NaiveDate,
    pub days_since_default: i64,
    pub filings: Vec<NormalizedFiling>,
    pub growth_signals: Vec<GrowthSignal>,
    pub health_score: HealthScore,
    pub estimated_revenue: Option<f64>,
    pub narrative: String,
}

/// Audit record of one enrichment pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    pub prospect_id: String,
    pub success: bool,
    pub enriched_fields: Vec<String>,
    pub errors: Vec<String>,
    /// 0..=1.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

// ============ Scheduler ============

/// Snapshot of the scheduler, polled by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub paused: bool,
    pub last_ingestion_run: Option<DateTime<Utc>>,
    pub last_enrichment_run: Option<DateTime<Utc>>,
    pub last_refresh_run: Option<DateTime<Utc>>,
    pub total_prospects_processed: u64,
    pub total_errors: u64,
    pub next_scheduled_run: Option<DateTime<Utc>>,
    /// Filings ingested but not yet enriched.
    pub pending_filings: usize,
    pub prospect_count: usize,
}
