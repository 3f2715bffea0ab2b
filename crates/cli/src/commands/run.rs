//! `run` command implementation.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::{ensure_config_exists, CliError};
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    ensure_config_exists(&args.config)?;

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Overrides go through sanitize again so the defaulting rules still apply
    if let Some(workers) = args.workers {
        info!(workers, "Overriding worker count from CLI");
        config.worker_count = workers;
    }
    if let Some(delay) = args.max_batch_delay_ms {
        info!(delay_ms = delay, "Overriding max batch delay from CLI");
        config.max_batch_delay_ms = delay;
    }
    let config = config_loader::ConfigLoader::sanitize(&config);

    info!(
        sink = %config.sink.name,
        sink_type = ?config.sink.sink_type,
        workers = config.worker_count,
        queue_size = config.worker_queue_size,
        max_batch_delay_ms = config.max_batch_delay_ms,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        config,
        input: args.input.clone(),
        max_records: (args.max_records > 0).then_some(args.max_records),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting pipeline...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    stats.print_summary();

    if stats.totals.records_dropped > 0 {
        warn!(dropped = stats.totals.records_dropped, "Records were dropped");
        return Err(CliError::delivery(&stats.sink_name, stats.totals.records_dropped).into());
    }

    info!("Flushline finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires rather than aborting the run.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
