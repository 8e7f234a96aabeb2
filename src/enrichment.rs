/// Filing → prospect enrichment.
///
/// One pass runs these steps, each isolated from the others:
/// 1. Classify the industry from the debtor name
/// 2. Estimate revenue (lien amount × industry multiplier, or a baseline sample)
/// 3. Detect growth signals through every configured signal provider
/// 4. Score business health from review sentiment and violations
/// 5. Compute the priority score
/// 6. Write the narrative
///
/// A failing capability adds an error entry and lowers confidence; it never
/// aborts the prospect.
use crate::errors::PipelineError;
use crate::models::*;
use crate::signals::{
    stable_seed, unit_from_seed, HealthInputs, HealthProvider, SignalProvider,
    SimulatedHealthProvider, SimulatedSignalProvider,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Age at which the filing-age component of the priority score saturates.
const AGE_SATURATION_DAYS: i64 = 1095;

/// Keyword vocabulary and revenue heuristics for one industry.
#[derive(Debug)]
pub struct IndustryProfile {
    pub name: &'static str,
    /// Word prefixes matched against the debtor name.
    pub keywords: &'static [&'static str],
    /// Revenue estimate as a multiple of the lien amount.
    pub revenue_multiplier: f64,
    /// Revenue range sampled when no lien amount is known.
    pub baseline_revenue: (f64, f64),
}

/// Checked in order; the first profile with a matching keyword wins.
pub const INDUSTRIES: &[IndustryProfile] = &[
    IndustryProfile {
        name: "manufacturing",
        keywords: &["manufactur", "mfg", "fabricat", "industrial", "machin", "plastics", "metal", "tool"],
        revenue_multiplier: 8.0,
        baseline_revenue: (2_000_000.0, 20_000_000.0),
    },
    IndustryProfile {
        name: "construction",
        keywords: &["construct", "builder", "roofing", "plumb", "electric", "contractor", "paving", "concrete", "excavat"],
        revenue_multiplier: 6.0,
        baseline_revenue: (1_000_000.0, 10_000_000.0),
    },
    IndustryProfile {
        name: "transportation",
        keywords: &["trucking", "transport", "logistic", "freight", "hauling", "courier", "express"],
        revenue_multiplier: 5.0,
        baseline_revenue: (1_000_000.0, 8_000_000.0),
    },
    IndustryProfile {
        name: "healthcare",
        keywords: &["medical", "health", "dental", "clinic", "pharma", "therapy", "care"],
        revenue_multiplier: 7.0,
        baseline_revenue: (1_500_000.0, 15_000_000.0),
    },
    IndustryProfile {
        name: "restaurant",
        keywords: &["restaurant", "cafe", "bistro", "grill", "pizza", "diner", "bakery", "catering", "kitchen"],
        revenue_multiplier: 4.0,
        baseline_revenue: (500_000.0, 3_000_000.0),
    },
    IndustryProfile {
        name: "retail",
        keywords: &["retail", "store", "shop", "boutique", "outlet", "mart", "market"],
        revenue_multiplier: 5.0,
        baseline_revenue: (500_000.0, 5_000_000.0),
    },
    IndustryProfile {
        name: "technology",
        keywords: &["tech", "software", "digital", "cyber", "data", "systems", "solutions"],
        revenue_multiplier: 10.0,
        baseline_revenue: (1_000_000.0, 25_000_000.0),
    },
    IndustryProfile {
        name: "agriculture",
        keywords: &["farm", "agri", "ranch", "dairy", "orchard", "nursery", "produce"],
        revenue_multiplier: 5.0,
        baseline_revenue: (500_000.0, 6_000_000.0),
    },
    IndustryProfile {
        name: "real estate",
        keywords: &["real estate", "realty", "propert", "holdings", "development"],
        revenue_multiplier: 6.0,
        baseline_revenue: (1_000_000.0, 12_000_000.0),
    },
];

/// Fallback when no keyword matches.
pub static SERVICES: IndustryProfile = IndustryProfile {
    name: "services",
    keywords: &[],
    revenue_multiplier: 5.0,
    baseline_revenue: (300_000.0, 3_000_000.0),
};

/// Prospect fields that [`EnrichmentService::refresh`] can re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshField {
    Industry,
    Revenue,
    GrowthSignals,
    HealthScore,
}

impl RefreshField {
    pub const ALL: [RefreshField; 4] = [
        RefreshField::Industry,
        RefreshField::Revenue,
        RefreshField::GrowthSignals,
        RefreshField::HealthScore,
    ];
}

/// Clamps into `[lo, hi]`, mapping NaN to `lo`.
fn bounded(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        lo
    } else {
        value.clamp(lo, hi)
    }
}

/// Industry profile for a debtor name. Returns the profile and whether a
/// keyword matched.
pub fn classify_industry(debtor_name: &str) -> (&'static IndustryProfile, bool) {
    let words: Vec<String> = debtor_name
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect();
    let padded = format!(" {}", words.join(" "));

    INDUSTRIES
        .iter()
        .find(|profile| {
            profile
                .keywords
                .iter()
                .any(|kw| padded.contains(&format!(" {}", kw)))
        })
        .map(|profile| (profile, true))
        .unwrap_or((&SERVICES, false))
}

fn profile_by_name(name: &str) -> &'static IndustryProfile {
    INDUSTRIES
        .iter()
        .find(|p| p.name == name)
        .unwrap_or(&SERVICES)
}

/// Estimated annual revenue. Always positive.
pub fn estimate_revenue(profile: &IndustryProfile, lien_amount: Option<f64>, company: &str) -> f64 {
    match lien_amount.filter(|a| a.is_finite() && *a > 0.0) {
        Some(amount) => (amount * profile.revenue_multiplier).round().max(1.0),
        None => {
            let (min, max) = profile.baseline_revenue;
            let sample = unit_from_seed(stable_seed(company, "revenue"));
            (min + sample * (max - min)).round().max(1.0)
        }
    }
}

/// Health score from raw inputs; overall and sentiment are clamped.
pub fn compute_health(inputs: &HealthInputs, now: DateTime<Utc>) -> HealthScore {
    let avg_sentiment = bounded(inputs.avg_sentiment, 0.0, 1.0);
    let prior = bounded(inputs.prior_sentiment, 0.0, 1.0);
    let review_bonus = inputs.review_count.min(100) as f64 / 10.0;
    let overall = bounded(
        avg_sentiment * 90.0 + review_bonus - inputs.violation_count as f64 * 7.5,
        0.0,
        100.0,
    );
    let overall = (overall * 10.0).round() / 10.0;

    let delta = avg_sentiment - prior;
    let sentiment_trend = if delta > 0.05 {
        SentimentTrend::Improving
    } else if delta < -0.05 {
        SentimentTrend::Declining
    } else {
        SentimentTrend::Stable
    };

    HealthScore {
        overall,
        grade: HealthGrade::from_score(overall),
        sentiment_trend,
        review_count: inputs.review_count,
        avg_sentiment,
        violation_count: inputs.violation_count,
        last_updated: now,
    }
}

/// Priority score in `[0, 100]`.
///
/// Filing age contributes up to 60 points (saturating at three years), signal
/// strength up to 25, health level ±5, and the sentiment trend +10 / 0 / -5.
pub fn compute_priority(days_since_default: i64, signals: &[GrowthSignal], health: &HealthScore) -> f64 {
    let age = 60.0 * days_since_default.clamp(0, AGE_SATURATION_DAYS) as f64
        / AGE_SATURATION_DAYS as f64;

    let strength: f64 = signals
        .iter()
        .map(|s| bounded(s.score, 0.0, 100.0) / 100.0 * bounded(s.confidence, 0.0, 1.0))
        .sum();
    let growth = 25.0 * (strength / 2.0).min(1.0);

    let health_level = (bounded(health.overall, 0.0, 100.0) - 50.0) / 50.0 * 5.0;
    let trend = match health.sentiment_trend {
        SentimentTrend::Improving => 10.0,
        SentimentTrend::Stable => 0.0,
        SentimentTrend::Declining => -5.0,
    };

    let score = bounded(age + growth + health_level + trend, 0.0, 100.0);
    (score * 10.0).round() / 10.0
}

/// Human-readable summary of a prospect.
pub fn generate_narrative(prospect: &Prospect) -> String {
    let health = &prospect.health_score;
    let signals = match prospect.growth_signals.len() {
        0 => "No growth signals detected.".to_string(),
        n => {
            let strongest = prospect
                .growth_signals
                .iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
                .map(|s| s.signal_type.as_str())
                .unwrap_or("unknown");
            format!("{} growth signal(s) detected, strongest: {}.", n, strongest)
        }
    };

    format!(
        "{} ({}, {}) defaulted {} days ago on {}. Health grade {} ({:.0}/100) with {} sentiment across {} reviews. {} Priority {:.1}/100.",
        prospect.company_name,
        prospect.industry,
        prospect.jurisdiction,
        prospect.days_since_default,
        prospect.default_date,
        health.grade.as_str(),
        health.overall,
        health.sentiment_trend.as_str(),
        health.review_count,
        signals,
        prospect.priority_score
    )
}

/// Per-pass bookkeeping of enriched fields, errors and confidence.
#[derive(Default)]
struct PassTracker {
    enriched_fields: Vec<String>,
    errors: Vec<String>,
    confidences: Vec<f64>,
}

impl PassTracker {
    fn enriched(&mut self, field: &str, confidence: f64) {
        self.enriched_fields.push(field.to_string());
        self.confidences.push(bounded(confidence, 0.0, 1.0));
    }

    /// A derived field: listed, but not part of the confidence average.
    fn derived(&mut self, field: &str) {
        self.enriched_fields.push(field.to_string());
    }

    fn failed(&mut self, error: String) {
        self.errors.push(error);
        self.confidences.push(0.0);
    }

    fn finish(self, prospect_id: &str, now: DateTime<Utc>) -> EnrichmentResult {
        let confidence = if self.confidences.is_empty() {
            0.0
        } else {
            self.confidences.iter().sum::<f64>() / self.confidences.len() as f64
        };
        EnrichmentResult {
            prospect_id: prospect_id.to_string(),
            success: self.errors.is_empty(),
            enriched_fields: self.enriched_fields,
            errors: self.errors,
            confidence: bounded(confidence, 0.0, 1.0),
            timestamp: now,
        }
    }
}

/// Outcome of the signal step across all providers.
struct SignalOutcome {
    signals: Vec<GrowthSignal>,
    errors: Vec<String>,
    providers_ok: usize,
}

/// Turns filings into scored prospects.
pub struct EnrichmentService {
    signal_providers: Vec<Arc<dyn SignalProvider>>,
    health_provider: Arc<dyn HealthProvider>,
    /// Company → detected signals (1 hour TTL).
    signal_cache: Cache<String, Vec<GrowthSignal>>,
}

impl EnrichmentService {
    pub fn new(
        signal_providers: Vec<Arc<dyn SignalProvider>>,
        health_provider: Arc<dyn HealthProvider>,
    ) -> Self {
        let signal_cache = Cache::builder()
            .time_to_live(Duration::from_secs(3600))
            .max_capacity(10_000)
            .build();

        Self {
            signal_providers,
            health_provider,
            signal_cache,
        }
    }

    /// Service backed by the simulated web-scraping, ML and health providers.
    pub fn simulated() -> Self {
        let providers: Vec<Arc<dyn SignalProvider>> = vec![
            Arc::new(SimulatedSignalProvider::web_scraper()),
            Arc::new(SimulatedSignalProvider::ml_model()),
        ];
        Self::new(providers, Arc::new(SimulatedHealthProvider))
    }

    /// Enriches one filing, optionally merging into an existing prospect.
    ///
    /// With `existing`, the prospect keeps its id, company name, status and
    /// prior filings; fields this pass could not produce keep their previous
    /// values.
    pub async fn enrich(
        &self,
        filing: &NormalizedFiling,
        existing: Option<&Prospect>,
    ) -> (Prospect, EnrichmentResult) {
        let now = Utc::now();
        let mut tracker = PassTracker::default();

        let company = existing
            .map(|p| p.company_name.clone())
            .unwrap_or_else(|| filing.debtor_name.trim().to_string());

        // 1. Industry
        let (profile, matched) = classify_industry(&filing.debtor_name);
        tracker.enriched("industry", if matched { 0.9 } else { 0.5 });

        // 2. Revenue
        let revenue = estimate_revenue(profile, filing.lien_amount, &company);
        tracker.enriched(
            "estimatedRevenue",
            if filing.lien_amount.is_some() { 0.8 } else { 0.4 },
        );

        // 3. Growth signals
        let outcome = self.detect_signals(&company, profile.name, true).await;
        let signals = self.apply_signal_outcome(outcome, &mut tracker);

        // 4. Health
        let health = self
            .score_health(&company, existing.map(|p| &p.health_score), now, &mut tracker)
            .await;

        let mut prospect = match existing {
            Some(prev) => {
                let mut merged = prev.clone();
                if !merged.filings.iter().any(|f| f.id == filing.id) {
                    merged.filings.push(filing.clone());
                }
                merged.default_date = merged.default_date.min(filing.filing_date);
                merged
            }
            None => Prospect {
                id: Uuid::new_v4().to_string(),
                company_name: company.clone(),
                industry: String::new(),
                jurisdiction: filing.jurisdiction.clone(),
                status: ProspectStatus::New,
                priority_score: 0.0,
                default_date: filing.filing_date,
                days_since_default: 0,
                filings: vec![filing.clone()],
                growth_signals: Vec::new(),
                health_score: HealthScore::unscored(),
                estimated_revenue: None,
                narrative: String::new(),
            },
        };

        prospect.industry = profile.name.to_string();
        prospect.estimated_revenue = Some(revenue);
        if let Some(signals) = signals {
            prospect.growth_signals = signals;
        }
        if let Some(health) = health {
            prospect.health_score = health;
        }

        // 5 & 6. Derived fields
        self.finalize(&mut prospect, now, &mut tracker);

        tracing::debug!(
            "Enriched {} ({}): priority {:.1}, {} error(s)",
            prospect.company_name,
            prospect.id,
            prospect.priority_score,
            tracker.errors.len()
        );

        let result = tracker.finish(&prospect.id, now);
        (prospect, result)
    }

    /// Re-runs `fields` (all when `None`) against an existing prospect.
    ///
    /// Priority and narrative are always recomputed. Fields outside the
    /// selection, and fields whose capability failed, keep their values.
    pub async fn refresh(
        &self,
        prospect: &Prospect,
        fields: Option<&[RefreshField]>,
    ) -> (Prospect, EnrichmentResult) {
        let now = Utc::now();
        let fields = fields.unwrap_or(&RefreshField::ALL);
        let mut tracker = PassTracker::default();
        let mut refreshed = prospect.clone();

        if fields.contains(&RefreshField::Industry) {
            let (profile, matched) = classify_industry(&refreshed.company_name);
            refreshed.industry = profile.name.to_string();
            tracker.enriched("industry", if matched { 0.9 } else { 0.5 });
        }

        if fields.contains(&RefreshField::Revenue) {
            let lien = refreshed
                .filings
                .iter()
                .filter(|f| f.lien_amount.is_some())
                .max_by_key(|f| f.filing_date)
                .and_then(|f| f.lien_amount);
            let profile = profile_by_name(&refreshed.industry);
            refreshed.estimated_revenue =
                Some(estimate_revenue(profile, lien, &refreshed.company_name));
            tracker.enriched("estimatedRevenue", if lien.is_some() { 0.8 } else { 0.4 });
        }

        if fields.contains(&RefreshField::GrowthSignals) {
            let outcome = self
                .detect_signals(&refreshed.company_name, &refreshed.industry, false)
                .await;
            if let Some(signals) = self.apply_signal_outcome(outcome, &mut tracker) {
                refreshed.growth_signals = signals;
            }
        }

        if fields.contains(&RefreshField::HealthScore) {
            if let Some(health) = self
                .score_health(&refreshed.company_name, None, now, &mut tracker)
                .await
            {
                refreshed.health_score = health;
            }
        }

        self.finalize(&mut refreshed, now, &mut tracker);

        tracing::debug!(
            "Refreshed {} ({} field(s)): priority {:.1} → {:.1}",
            refreshed.id,
            fields.len(),
            prospect.priority_score,
            refreshed.priority_score
        );

        let result = tracker.finish(&refreshed.id, now);
        (refreshed, result)
    }

    /// Enriches new filings with at most `concurrency` passes in flight.
    /// Results are returned in input order.
    pub async fn enrich_batch(
        &self,
        filings: &[NormalizedFiling],
        concurrency: usize,
    ) -> Vec<(Prospect, EnrichmentResult)> {
        let items = filings.iter().cloned().map(|f| (f, None)).collect();
        self.enrich_batch_with(items, concurrency).await
    }

    /// Like [`enrich_batch`](Self::enrich_batch), with an optional existing
    /// prospect per filing.
    pub async fn enrich_batch_with(
        &self,
        items: Vec<(NormalizedFiling, Option<Prospect>)>,
        concurrency: usize,
    ) -> Vec<(Prospect, EnrichmentResult)> {
        stream::iter(items.into_iter().map(|(filing, existing)| async move {
            self.enrich(&filing, existing.as_ref()).await
        }))
        .buffered(concurrency.max(1))
        .collect()
        .await
    }

    /// Refreshes several prospects with bounded concurrency, in input order.
    pub async fn refresh_batch(
        &self,
        prospects: Vec<Prospect>,
        fields: Option<&[RefreshField]>,
        concurrency: usize,
    ) -> Vec<(Prospect, EnrichmentResult)> {
        stream::iter(
            prospects
                .into_iter()
                .map(|p| async move { self.refresh(&p, fields).await }),
        )
        .buffered(concurrency.max(1))
        .collect()
        .await
    }

    async fn detect_signals(&self, company: &str, industry: &str, use_cache: bool) -> SignalOutcome {
        let cache_key = company.trim().to_lowercase();
        if use_cache {
            if let Some(cached) = self.signal_cache.get(&cache_key).await {
                return SignalOutcome {
                    signals: cached,
                    errors: Vec::new(),
                    providers_ok: self.signal_providers.len(),
                };
            }
        }

        let mut outcome = SignalOutcome {
            signals: Vec::new(),
            errors: Vec::new(),
            providers_ok: 0,
        };

        for provider in &self.signal_providers {
            match provider.detect(company, industry).await {
                Ok(signals) => {
                    outcome.providers_ok += 1;
                    outcome.signals.extend(signals.into_iter().map(|mut s| {
                        s.confidence = bounded(s.confidence, 0.0, 1.0);
                        s.score = bounded(s.score, 0.0, 100.0);
                        s
                    }));
                }
                Err(e) => {
                    tracing::warn!(
                        "Signal provider {} failed for {}: {}",
                        provider.name(),
                        company,
                        e
                    );
                    outcome.errors.push(
                        PipelineError::Provider {
                            provider: provider.name().to_string(),
                            message: e.to_string(),
                        }
                        .to_string(),
                    );
                }
            }
        }

        if outcome.errors.is_empty() {
            self.signal_cache
                .insert(cache_key, outcome.signals.clone())
                .await;
        }

        outcome
    }

    /// Records the signal step and returns the signals to store, or `None`
    /// when every provider failed and the previous value should stay.
    fn apply_signal_outcome(
        &self,
        outcome: SignalOutcome,
        tracker: &mut PassTracker,
    ) -> Option<Vec<GrowthSignal>> {
        let total = self.signal_providers.len();
        tracker.errors.extend(outcome.errors);

        if total > 0 && outcome.providers_ok == 0 {
            tracker.confidences.push(0.0);
            return None;
        }

        let mean_confidence = if outcome.signals.is_empty() {
            0.6
        } else {
            outcome.signals.iter().map(|s| s.confidence).sum::<f64>()
                / outcome.signals.len() as f64
        };
        let coverage = if total == 0 {
            1.0
        } else {
            outcome.providers_ok as f64 / total as f64
        };
        tracker.enriched("growthSignals", mean_confidence * coverage);
        Some(outcome.signals)
    }

    async fn score_health(
        &self,
        company: &str,
        previous: Option<&HealthScore>,
        now: DateTime<Utc>,
        tracker: &mut PassTracker,
    ) -> Option<HealthScore> {
        match self.health_provider.health_inputs(company).await {
            Ok(inputs) => {
                tracker.enriched("healthScore", 0.7);
                Some(compute_health(&inputs, now))
            }
            Err(e) => {
                tracing::warn!(
                    "Health provider {} failed for {}: {}",
                    self.health_provider.name(),
                    company,
                    e
                );
                tracker.failed(
                    PipelineError::Provider {
                        provider: self.health_provider.name().to_string(),
                        message: e.to_string(),
                    }
                    .to_string(),
                );
                previous.cloned()
            }
        }
    }

    fn finalize(&self, prospect: &mut Prospect, now: DateTime<Utc>, tracker: &mut PassTracker) {
        prospect.days_since_default = (now.date_naive() - prospect.default_date)
            .num_days()
            .max(0);
        prospect.priority_score = compute_priority(
            prospect.days_since_default,
            &prospect.growth_signals,
            &prospect.health_score,
        );
        tracker.derived("priorityScore");
        prospect.narrative = generate_narrative(prospect);
        tracker.derived("narrative");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn health(overall: f64, trend: SentimentTrend) -> HealthScore {
        HealthScore {
            overall,
            grade: HealthGrade::from_score(overall),
            sentiment_trend: trend,
            review_count: 10,
            avg_sentiment: 0.5,
            violation_count: 0,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_classify_industry_keywords() {
        assert_eq!(classify_industry("Acme Manufacturing LLC").0.name, "manufacturing");
        assert_eq!(classify_industry("Hudson Trucking Inc").0.name, "transportation");
        assert_eq!(classify_industry("Bay Bistro").0.name, "restaurant");
        assert_eq!(classify_industry("Sunrise Dental Group").0.name, "healthcare");
        assert_eq!(classify_industry("Oak Realty Partners").0.name, "real estate");
        assert_eq!(classify_industry("ACME MFG CO").0.name, "manufacturing");
    }

    #[test]
    fn test_classify_industry_defaults_to_services() {
        let (profile, matched) = classify_industry("Smith & Sons LLC");
        assert_eq!(profile.name, "services");
        assert!(!matched);
    }

    #[test]
    fn test_keywords_match_word_starts_only() {
        // "artech" contains "tech" but not at a word start
        assert_eq!(classify_industry("Artech Partners").0.name, "services");
    }

    #[test]
    fn test_revenue_is_positive() {
        let (profile, _) = classify_industry("Acme Manufacturing LLC");
        assert_eq!(estimate_revenue(profile, Some(500_000.0), "Acme"), 4_000_000.0);

        let sampled = estimate_revenue(profile, None, "Acme");
        assert!(sampled >= profile.baseline_revenue.0 && sampled <= profile.baseline_revenue.1);
        assert!(estimate_revenue(&SERVICES, Some(0.0), "Zero Co") > 0.0);
        assert!(estimate_revenue(&SERVICES, Some(f64::NAN), "Nan Co") > 0.0);
    }

    #[test]
    fn test_health_bounds_and_trend() {
        let now = Utc::now();
        let great = compute_health(
            &HealthInputs {
                review_count: 500,
                avg_sentiment: 1.4,
                prior_sentiment: 0.5,
                violation_count: 0,
            },
            now,
        );
        assert_eq!(great.overall, 100.0);
        assert_eq!(great.grade, HealthGrade::A);
        assert_eq!(great.avg_sentiment, 1.0);
        assert_eq!(great.sentiment_trend, SentimentTrend::Improving);

        let poor = compute_health(
            &HealthInputs {
                review_count: 3,
                avg_sentiment: 0.2,
                prior_sentiment: 0.6,
                violation_count: 9,
            },
            now,
        );
        assert_eq!(poor.overall, 0.0);
        assert_eq!(poor.grade, HealthGrade::F);
        assert_eq!(poor.sentiment_trend, SentimentTrend::Declining);
    }

    #[test]
    fn test_priority_grows_with_age_and_saturates() {
        let h = health(50.0, SentimentTrend::Stable);
        let young = compute_priority(30, &[], &h);
        let old = compute_priority(900, &[], &h);
        let saturated = compute_priority(1500, &[], &h);
        let ancient = compute_priority(5000, &[], &h);

        assert!(young < old);
        assert!(old < saturated);
        assert_eq!(saturated, ancient);
        assert_eq!(saturated, 60.0);
    }

    #[test]
    fn test_priority_trend_and_signals() {
        let signal = GrowthSignal {
            id: "s1".into(),
            signal_type: GrowthSignalType::Hiring,
            description: "hiring".into(),
            detected_date: Utc::now() - ChronoDuration::days(3),
            score: 100.0,
            confidence: 1.0,
        };

        let improving = compute_priority(365, &[], &health(50.0, SentimentTrend::Improving));
        let declining = compute_priority(365, &[], &health(50.0, SentimentTrend::Declining));
        let with_signal = compute_priority(365, &[signal], &health(50.0, SentimentTrend::Stable));
        let stable = compute_priority(365, &[], &health(50.0, SentimentTrend::Stable));

        assert!(improving > stable);
        assert!(declining < stable);
        assert!(with_signal > stable);
        assert!(compute_priority(-10, &[], &health(0.0, SentimentTrend::Declining)) >= 0.0);
    }
}
