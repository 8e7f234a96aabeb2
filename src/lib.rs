//! Lien Prospect Pipeline Library
//!
//! Ingests public lien filings from per-source APIs, state portals and filing
//! stores, enriches them into scored sales prospects, and keeps those
//! prospects fresh on a recurring schedule.
//!
//! # Modules
//!
//! - `rate_limiter`: Per-source sliding-window rate limiting.
//! - `circuit_breaker`: Per-source circuit breakers.
//! - `retry`: Exponential backoff for transient fetch errors.
//! - `sources`: Filing source clients (API, portal scraper, filing store).
//! - `ingestion`: Fetch, normalize and deduplicate filings.
//! - `signals`: Growth-signal and health providers.
//! - `enrichment`: Filing → prospect transform and scoring.
//! - `store`: In-memory prospect index.
//! - `events`: Scheduler lifecycle events.
//! - `scheduler`: Recurring ingestion, enrichment and refresh.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `models`: Core data models.

pub mod circuit_breaker;
pub mod config;
pub mod enrichment;
pub mod errors;
pub mod events;
pub mod ingestion;
pub mod models;
pub mod rate_limiter;
pub mod retry;
pub mod scheduler;
pub mod signals;
pub mod sources;
pub mod store;
