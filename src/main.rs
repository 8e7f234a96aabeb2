use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lien_prospect_pipeline::config::PipelineConfig;
use lien_prospect_pipeline::enrichment::EnrichmentService;
use lien_prospect_pipeline::events::SchedulerEventKind;
use lien_prospect_pipeline::ingestion::IngestionService;
use lien_prospect_pipeline::scheduler::RefreshScheduler;

/// Runs the pipeline until Ctrl-C.
///
/// Loads configuration, wires ingestion and enrichment into the scheduler and,
/// when `PIPELINE_AUTO_START` is set, starts the timers. The final status is
/// logged on shutdown.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lien_prospect_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = PipelineConfig::from_env()?;

    let ingestion = Arc::new(IngestionService::from_config(&config)?);
    tracing::info!(
        "Ingestion service ready: {} source(s), regions {}",
        ingestion.sources().len(),
        ingestion.regions().join(",")
    );

    let enrichment = Arc::new(EnrichmentService::simulated());
    tracing::info!("Enrichment service ready (simulated signal providers)");

    let auto_start = config.auto_start;
    let scheduler = Arc::new(RefreshScheduler::new(config, ingestion, enrichment));

    let _errors = scheduler.on(|event| {
        if event.kind == SchedulerEventKind::Error {
            tracing::warn!(
                "Pipeline error event: {}",
                event.error.as_deref().unwrap_or("unknown")
            );
        }
    });

    if auto_start {
        scheduler.start();
    } else {
        tracing::info!("PIPELINE_AUTO_START not set; scheduler idle");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    scheduler.stop();

    let status = scheduler.status();
    tracing::info!(
        "Final status: {} processed, {} error(s), {} prospect(s), {} pending filing(s)",
        status.total_prospects_processed,
        status.total_errors,
        status.prospect_count,
        status.pending_filings
    );

    Ok(())
}
