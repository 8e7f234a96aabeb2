//! Recurring ingestion, enrichment and refresh.
//!
//! [`RefreshScheduler`] owns three timers, the pending-filing queue and the
//! prospect store. Each timer task spawns its tick and waits for it, so a
//! timer never overlaps with itself. Cancelling a timer leaves a running tick
//! alone. Manual triggers may interleave with a tick: every run claims the
//! companies it works on, and a company claimed by one run is left for the
//! next. Counters are atomic increments and every lock is released before
//! the next `.await`.

use crate::config::PipelineConfig;
use crate::enrichment::EnrichmentService;
use crate::errors::PipelineError;
use crate::events::{EventBus, SchedulerEvent, SchedulerEventKind, Subscription};
use crate::ingestion::IngestionService;
use crate::models::{
    EnrichmentResult, IngestionRunResult, NormalizedFiling, Prospect, SchedulerStatus,
};
use crate::store::{company_key, ProspectIndex, ProspectRepository};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerJob {
    Ingestion,
    Enrichment,
    Refresh,
}

impl TimerJob {
    const ALL: [TimerJob; 3] = [TimerJob::Ingestion, TimerJob::Enrichment, TimerJob::Refresh];

    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            TimerJob::Ingestion => "ingestion",
            TimerJob::Enrichment => "enrichment",
            TimerJob::Refresh => "refresh",
        }
    }
}

/// Filings waiting for enrichment, plus every filing id seen so far.
#[derive(Default)]
struct PendingFilings {
    queue: VecDeque<NormalizedFiling>,
    known: HashSet<String>,
}

impl PendingFilings {
    /// Queues filings not already queued or enriched. Returns how many were new.
    fn enqueue(&mut self, filings: impl IntoIterator<Item = NormalizedFiling>) -> usize {
        let mut added = 0;
        for filing in filings {
            if self.known.insert(filing.id.clone()) {
                self.queue.push_back(filing);
                added += 1;
            }
        }
        added
    }

    /// Takes up to `limit` filings, at most one per company and none for a
    /// company in `busy`. Skipped filings keep their place in the queue.
    fn take_batch(&mut self, limit: usize, busy: &HashSet<String>) -> Vec<NormalizedFiling> {
        let mut batch = Vec::new();
        let mut companies = HashSet::new();
        let mut kept = VecDeque::with_capacity(self.queue.len());

        while let Some(filing) = self.queue.pop_front() {
            let key = company_key(&filing.debtor_name);
            if batch.len() < limit && !busy.contains(&key) && companies.insert(key) {
                batch.push(filing);
            } else {
                kept.push_back(filing);
            }
        }

        self.queue = kept;
        batch
    }
}

/// Company keys held by a running enrichment or refresh pass. Released on
/// drop, after the pass has written its prospects back.
struct CompanyClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    keys: Vec<String>,
}

impl Drop for CompanyClaim<'_> {
    fn drop(&mut self) {
        let mut in_flight = lock(self.in_flight);
        for key in &self.keys {
            in_flight.remove(key);
        }
    }
}

#[derive(Default)]
struct RunTimes {
    last: [Option<DateTime<Utc>>; 3],
    next: [Option<DateTime<Utc>>; 3],
}

pub struct RefreshScheduler {
    config: PipelineConfig,
    ingestion: Arc<IngestionService>,
    enrichment: Arc<EnrichmentService>,
    store: Mutex<Box<dyn ProspectRepository>>,
    pending: Mutex<PendingFilings>,
    in_flight: Mutex<HashSet<String>>,
    events: EventBus,
    running: AtomicBool,
    paused: AtomicBool,
    total_processed: AtomicU64,
    total_errors: AtomicU64,
    runs: Mutex<RunTimes>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(
        config: PipelineConfig,
        ingestion: Arc<IngestionService>,
        enrichment: Arc<EnrichmentService>,
    ) -> Self {
        Self::with_store(config, ingestion, enrichment, Box::new(ProspectIndex::new()))
    }

    pub fn with_store(
        config: PipelineConfig,
        ingestion: Arc<IngestionService>,
        enrichment: Arc<EnrichmentService>,
        store: Box<dyn ProspectRepository>,
    ) -> Self {
        Self {
            config,
            ingestion,
            enrichment,
            store: Mutex::new(store),
            pending: Mutex::new(PendingFilings::default()),
            in_flight: Mutex::new(HashSet::new()),
            events: EventBus::new(),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            total_processed: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            runs: Mutex::new(RunTimes::default()),
            timers: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Arms the ingestion, enrichment and refresh timers.
    ///
    /// Calling `start` on a running scheduler logs a warning and does nothing.
    /// With the pipeline disabled the scheduler reports running but only
    /// manual triggers do work.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Scheduler already running; start ignored");
            return;
        }
        self.paused.store(false, Ordering::SeqCst);

        if !self.config.enabled {
            tracing::info!("Pipeline disabled: scheduler running without timers");
            return;
        }

        self.arm_timers();
        tracing::info!(
            "Scheduler started (ingestion every {:?}, enrichment every {:?}, refresh every {:?})",
            self.config.ingestion_interval(),
            self.config.enrichment_interval(),
            self.config.refresh_interval()
        );
    }

    /// Cancels the timers. A tick already in flight runs to completion and
    /// its results are still stored and counted.
    pub fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.disarm_timers();
        if was_running {
            tracing::info!("Scheduler stopped");
        }
    }

    pub fn pause(&self) {
        if !self.is_running() || self.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disarm_timers();
        tracing::info!("Scheduler paused");
    }

    pub fn resume(self: &Arc<Self>) {
        if !self.is_running() || !self.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        if self.config.enabled {
            self.arm_timers();
        }
        tracing::info!("Scheduler resumed");
    }

    fn arm_timers(self: &Arc<Self>) {
        let mut timers = lock(&self.timers);
        for handle in timers.drain(..) {
            handle.abort();
        }

        for job in TimerJob::ALL {
            let period = self.interval_for(job);
            let scheduler = Arc::clone(self);
            timers.push(tokio::spawn(async move {
                let first = Instant::now() + period;
                let mut interval = interval_at(first, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                scheduler.set_next_run(job, Some(wall_clock_at(first)));
                loop {
                    let fired = interval.tick().await;
                    // Aborting this loop detaches the tick instead of cancelling it
                    let tick = tokio::spawn({
                        let scheduler = Arc::clone(&scheduler);
                        async move { scheduler.run_tick(job).await }
                    });
                    if let Err(e) = tick.await {
                        tracing::error!("{} tick task failed: {}", job.label(), e);
                    }
                    let next = (fired + period).max(Instant::now());
                    scheduler.set_next_run(job, Some(wall_clock_at(next)));
                }
            }));
        }
    }

    fn disarm_timers(&self) {
        for handle in lock(&self.timers).drain(..) {
            handle.abort();
        }
        lock(&self.runs).next = [None; 3];
    }

    fn interval_for(&self, job: TimerJob) -> Duration {
        match job {
            TimerJob::Ingestion => self.config.ingestion_interval(),
            TimerJob::Enrichment => self.config.enrichment_interval(),
            TimerJob::Refresh => self.config.refresh_interval(),
        }
    }

    async fn run_tick(&self, job: TimerJob) {
        let tick = async {
            match job {
                TimerJob::Ingestion => {
                    self.trigger_ingestion(None).await;
                }
                TimerJob::Enrichment => {
                    self.trigger_enrichment(None).await;
                }
                TimerJob::Refresh => {
                    self.trigger_refresh().await;
                }
            }
        };

        if AssertUnwindSafe(tick).catch_unwind().await.is_err() {
            tracing::error!("{} tick panicked; timer keeps running", job.label());
            self.total_errors.fetch_add(1, Ordering::SeqCst);
            self.events.emit(SchedulerEvent::error(
                format!("{} tick failed", job.label()),
                Some(json!({ "job": job.label() })),
            ));
        }
    }

    /// Ingests `regions` (configured regions when `None`) and queues filings
    /// not seen before.
    ///
    /// Emits `ingestion-started`, then `ingestion-completed`, or `error` when
    /// every source/region pair failed.
    pub async fn trigger_ingestion(&self, regions: Option<&[String]>) -> Vec<IngestionRunResult> {
        self.events.emit(SchedulerEvent::new(
            SchedulerEventKind::IngestionStarted,
            Some(json!({ "regions": regions })),
        ));

        let results = self.ingestion.ingest(regions).await;

        let record_count: usize = results.iter().map(|r| r.filings.len()).sum();
        let failed = results.iter().filter(|r| !r.success).count();
        let queued = lock(&self.pending).enqueue(results.iter().flat_map(|r| r.filings.clone()));

        self.total_processed
            .fetch_add(record_count as u64, Ordering::SeqCst);
        self.total_errors.fetch_add(failed as u64, Ordering::SeqCst);
        self.mark_run(TimerJob::Ingestion);

        let mut data = json!({
            "recordCount": record_count,
            "queued": queued,
            "runs": results.len(),
            "failedRuns": failed,
        });

        if !results.is_empty() && failed == results.len() {
            let message = results
                .iter()
                .flat_map(|r| r.errors.last())
                .cloned()
                .collect::<Vec<_>>()
                .join("; ");
            tracing::error!("Ingestion failed for all {} run(s): {}", failed, message);
            self.events.emit(SchedulerEvent::error(
                format!("Ingestion failed for all {} run(s): {}", failed, message),
                Some(data),
            ));
        } else {
            if failed > 0 {
                let partial = PipelineError::PartialBatchFailure {
                    failed,
                    total: results.len(),
                };
                tracing::warn!("Ingestion tick: {}", partial);
                data["error"] = json!(partial.to_string());
            }
            tracing::info!(
                "Ingestion tick: {} record(s), {} newly queued, {} failed run(s)",
                record_count,
                queued,
                failed
            );
            self.events.emit(SchedulerEvent::new(
                SchedulerEventKind::IngestionCompleted,
                Some(data),
            ));
        }

        results
    }

    /// Enriches pending filings, or re-enriches the given prospects in full.
    ///
    /// Without ids, up to `enrichment_batch_size` queued filings are taken,
    /// one per company; each is merged into the stored prospect of the same
    /// company when there is one. Filings of a company another run is still
    /// working on stay queued.
    ///
    /// With ids, unknown ids and prospects another run is working on are
    /// skipped and listed in the completion event.
    pub async fn trigger_enrichment(&self, prospect_ids: Option<&[String]>) -> Vec<EnrichmentResult> {
        let concurrency = self.config.enrichment_concurrency;

        let (outcomes, missing, busy, _claim) = match prospect_ids {
            None => {
                let (batch, claim) = self.claim_pending();
                self.events.emit(SchedulerEvent::new(
                    SchedulerEventKind::EnrichmentStarted,
                    Some(json!({ "filings": batch.len() })),
                ));

                let items: Vec<(NormalizedFiling, Option<Prospect>)> = {
                    let store = lock(&self.store);
                    batch
                        .into_iter()
                        .map(|filing| {
                            let existing = store.find_by_company(&filing.debtor_name);
                            (filing, existing)
                        })
                        .collect()
                };

                (
                    self.enrichment.enrich_batch_with(items, concurrency).await,
                    Vec::new(),
                    Vec::new(),
                    claim,
                )
            }
            Some(ids) => {
                let mut missing = Vec::new();
                let mut busy = Vec::new();
                let (prospects, claim) = {
                    let mut in_flight = lock(&self.in_flight);
                    let store = lock(&self.store);
                    let mut prospects = Vec::new();
                    let mut keys = Vec::new();
                    for id in ids {
                        match store.get(id) {
                            None => missing.push(id.clone()),
                            Some(p) => {
                                let key = company_key(&p.company_name);
                                if in_flight.insert(key.clone()) {
                                    keys.push(key);
                                    prospects.push(p);
                                } else {
                                    busy.push(id.clone());
                                }
                            }
                        }
                    }
                    (prospects, self.claim(keys))
                };
                if !missing.is_empty() {
                    tracing::warn!("Unknown prospect id(s) skipped: {}", missing.join(", "));
                }
                if !busy.is_empty() {
                    tracing::warn!("Prospect(s) already being enriched, skipped: {}", busy.join(", "));
                }

                self.events.emit(SchedulerEvent::new(
                    SchedulerEventKind::EnrichmentStarted,
                    Some(json!({ "prospects": prospects.len() })),
                ));

                (
                    self.enrichment.refresh_batch(prospects, None, concurrency).await,
                    missing,
                    busy,
                    claim,
                )
            }
        };

        let results = self.store_outcomes(outcomes);
        let failed = results.iter().filter(|r| !r.success).count();

        self.total_processed
            .fetch_add(results.len() as u64, Ordering::SeqCst);
        self.total_errors.fetch_add(failed as u64, Ordering::SeqCst);
        self.mark_run(TimerJob::Enrichment);

        let remaining = lock(&self.pending).queue.len();
        tracing::info!(
            "Enrichment tick: {} prospect(s), {} with errors, {} filing(s) still queued",
            results.len(),
            failed,
            remaining
        );
        self.events.emit(SchedulerEvent::new(
            SchedulerEventKind::EnrichmentCompleted,
            Some(json!({
                "processed": results.len(),
                "failed": failed,
                "remaining": remaining,
                "missing": missing,
                "busy": busy,
            })),
        ));

        results
    }

    /// Refreshes prospects whose health data is older than the stale
    /// threshold. Fresh prospects, and prospects another run is enriching,
    /// are left alone.
    pub async fn trigger_refresh(&self) -> Vec<EnrichmentResult> {
        let now = Utc::now();
        let threshold = chrono::Duration::days(self.config.stale_data_threshold_days);

        let (stale, total, _claim) = {
            let mut in_flight = lock(&self.in_flight);
            let store = lock(&self.store);
            let all = store.all();
            let total = all.len();
            let mut keys = Vec::new();
            let mut stale = Vec::new();
            for prospect in all {
                if now - prospect.health_score.last_updated <= threshold {
                    continue;
                }
                // Busy prospects are picked up by the next pass
                let key = company_key(&prospect.company_name);
                if in_flight.insert(key.clone()) {
                    keys.push(key);
                    stale.push(prospect);
                }
            }
            (stale, total, self.claim(keys))
        };
        let skipped = total - stale.len();

        let outcomes = self
            .enrichment
            .refresh_batch(stale, None, self.config.enrichment_concurrency)
            .await;
        let results = self.store_outcomes(outcomes);
        let failed = results.iter().filter(|r| !r.success).count();

        self.total_processed
            .fetch_add(results.len() as u64, Ordering::SeqCst);
        self.total_errors.fetch_add(failed as u64, Ordering::SeqCst);
        self.mark_run(TimerJob::Refresh);

        tracing::info!(
            "Refresh tick: {} stale prospect(s) refreshed, {} skipped",
            results.len(),
            skipped
        );
        self.events.emit(SchedulerEvent::new(
            SchedulerEventKind::RefreshCompleted,
            Some(json!({
                "refreshed": results.len(),
                "skipped": skipped,
                "failed": failed,
            })),
        ));

        results
    }

    /// Takes the next enrichment batch and claims its companies, holding the
    /// queue lock so no other run can take the same company in between.
    fn claim_pending(&self) -> (Vec<NormalizedFiling>, CompanyClaim<'_>) {
        let mut pending = lock(&self.pending);
        let mut in_flight = lock(&self.in_flight);
        let batch = pending.take_batch(self.config.enrichment_batch_size, &in_flight);
        let keys: Vec<String> = batch.iter().map(|f| company_key(&f.debtor_name)).collect();
        in_flight.extend(keys.iter().cloned());
        drop(in_flight);
        (batch, self.claim(keys))
    }

    /// Wraps keys already inserted into `in_flight`.
    fn claim(&self, keys: Vec<String>) -> CompanyClaim<'_> {
        CompanyClaim {
            in_flight: &self.in_flight,
            keys,
        }
    }

    fn store_outcomes(&self, outcomes: Vec<(Prospect, EnrichmentResult)>) -> Vec<EnrichmentResult> {
        let mut store = lock(&self.store);
        outcomes
            .into_iter()
            .map(|(prospect, result)| {
                store.upsert(prospect);
                result
            })
            .collect()
    }

    fn mark_run(&self, job: TimerJob) {
        lock(&self.runs).last[job.index()] = Some(Utc::now());
    }

    fn set_next_run(&self, job: TimerJob, at: Option<DateTime<Utc>>) {
        lock(&self.runs).next[job.index()] = at;
    }

    /// Registers an event handler. Handlers run in registration order.
    pub fn on<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        self.events.on(handler)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> SchedulerStatus {
        let (last, next) = {
            let runs = lock(&self.runs);
            (runs.last, runs.next)
        };

        SchedulerStatus {
            running: self.is_running(),
            paused: self.paused.load(Ordering::SeqCst),
            last_ingestion_run: last[TimerJob::Ingestion.index()],
            last_enrichment_run: last[TimerJob::Enrichment.index()],
            last_refresh_run: last[TimerJob::Refresh.index()],
            total_prospects_processed: self.total_processed.load(Ordering::SeqCst),
            total_errors: self.total_errors.load(Ordering::SeqCst),
            next_scheduled_run: next.into_iter().flatten().min(),
            pending_filings: lock(&self.pending).queue.len(),
            prospect_count: lock(&self.store).len(),
        }
    }

    pub fn prospects(&self) -> Vec<Prospect> {
        lock(&self.store).all()
    }

    pub fn prospect(&self, id: &str) -> Option<Prospect> {
        lock(&self.store).get(id)
    }

    /// Preloads prospects, e.g. from persistent storage. Their filings count
    /// as already seen, so ingestion won't queue them again.
    pub fn seed_prospects(&self, prospects: Vec<Prospect>) {
        let count = prospects.len();
        {
            let mut pending = lock(&self.pending);
            for prospect in &prospects {
                pending
                    .known
                    .extend(prospect.filings.iter().map(|f| f.id.clone()));
            }
        }

        let mut store = lock(&self.store);
        for prospect in prospects {
            store.upsert(prospect);
        }
        tracing::info!("Seeded {} prospect(s)", count);
    }
}

fn wall_clock_at(deadline: Instant) -> DateTime<Utc> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    let offset = chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero());
    Utc::now() + offset
}
