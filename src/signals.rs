//! Growth-signal and health capabilities consumed by enrichment.
//!
//! The production signal vendors (job-board scraping, permit feeds, ML
//! inference) and review/violation feeds sit behind [`SignalProvider`] and
//! [`HealthProvider`]. The simulated providers derive stable pseudo-random
//! values from a hash of the company name so repeated runs agree.

use crate::errors::PipelineError;
use crate::models::{GrowthSignal, GrowthSignalType};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

/// Detects growth signals for a company.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn detect(
        &self,
        company: &str,
        industry: &str,
    ) -> Result<Vec<GrowthSignal>, PipelineError>;
}

/// Raw inputs for a health score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInputs {
    pub review_count: u32,
    /// Current average review sentiment, 0..=1.
    pub avg_sentiment: f64,
    /// Average sentiment of the previous period, used for the trend.
    pub prior_sentiment: f64,
    pub violation_count: u32,
}

/// Supplies review sentiment and regulatory violations for a company.
#[async_trait]
pub trait HealthProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn health_inputs(&self, company: &str) -> Result<HealthInputs, PipelineError>;
}

/// Stable 64-bit seed for `text`, salted so different uses don't correlate.
pub fn stable_seed(text: &str, salt: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(text.trim().to_lowercase().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Maps a seed onto `[0, 1)`.
pub fn unit_from_seed(seed: u64) -> f64 {
    (seed % 10_000) as f64 / 10_000.0
}

/// How a simulated provider would gather its signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalCapability {
    /// Job boards, permit portals, press releases.
    WebScraping,
    /// Model scoring over equipment financing and contract data.
    MlInference,
}

impl SignalCapability {
    fn signal_types(&self) -> &'static [GrowthSignalType] {
        match self {
            SignalCapability::WebScraping => &[
                GrowthSignalType::Hiring,
                GrowthSignalType::Expansion,
                GrowthSignalType::Permit,
            ],
            SignalCapability::MlInference => {
                &[GrowthSignalType::Equipment, GrowthSignalType::Contract]
            }
        }
    }

    fn confidence_range(&self) -> (f64, f64) {
        match self {
            SignalCapability::WebScraping => (0.6, 0.9),
            SignalCapability::MlInference => (0.5, 0.95),
        }
    }
}

/// Deterministic stand-in for a real signal vendor.
#[derive(Debug, Clone)]
pub struct SimulatedSignalProvider {
    name: String,
    capability: SignalCapability,
}

impl SimulatedSignalProvider {
    pub fn new(name: impl Into<String>, capability: SignalCapability) -> Self {
        Self {
            name: name.into(),
            capability,
        }
    }

    pub fn web_scraper() -> Self {
        Self::new("web-scraper", SignalCapability::WebScraping)
    }

    pub fn ml_model() -> Self {
        Self::new("ml-inference", SignalCapability::MlInference)
    }
}

#[async_trait]
impl SignalProvider for SimulatedSignalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(
        &self,
        company: &str,
        industry: &str,
    ) -> Result<Vec<GrowthSignal>, PipelineError> {
        let types = self.capability.signal_types();
        let seed = stable_seed(company, &self.name);
        let count = (seed % (types.len() as u64 + 1)) as usize;
        let (min_conf, max_conf) = self.capability.confidence_range();
        let now = Utc::now();

        let signals = (0..count)
            .map(|i| {
                let s = stable_seed(company, &format!("{}:{}", self.name, i));
                let signal_type = types[(s as usize) % types.len()];
                GrowthSignal {
                    id: format!("{}-{}-{:08x}", self.name, signal_type.as_str(), s as u32),
                    signal_type,
                    description: format!(
                        "{} activity detected for {} ({})",
                        signal_type.as_str(),
                        company,
                        industry
                    ),
                    detected_date: now - Duration::days((s % 90) as i64),
                    score: 40.0 + unit_from_seed(s >> 8) * 60.0,
                    confidence: min_conf + unit_from_seed(s >> 24) * (max_conf - min_conf),
                }
            })
            .collect();

        Ok(signals)
    }
}

/// Deterministic stand-in for review and violation feeds.
#[derive(Debug, Clone, Default)]
pub struct SimulatedHealthProvider;

#[async_trait]
impl HealthProvider for SimulatedHealthProvider {
    fn name(&self) -> &str {
        "simulated-health"
    }

    async fn health_inputs(&self, company: &str) -> Result<HealthInputs, PipelineError> {
        let seed = stable_seed(company, "health");
        let avg_sentiment = 0.3 + unit_from_seed(seed >> 8) * 0.7;
        let drift = (unit_from_seed(seed >> 24) - 0.5) * 0.3;

        Ok(HealthInputs {
            review_count: (seed % 200) as u32,
            avg_sentiment,
            prior_sentiment: (avg_sentiment - drift).clamp(0.0, 1.0),
            violation_count: ((seed >> 40) % 4) as u32,
        })
    }
}
