//! Pipeline orchestrator - feeds input lines into the streamer.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::StreamerConfig;
use streamer::{create_streamer, MetricsSnapshot, StreamerError, TracingLogger};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use super::RunStats;
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sanitized and validated engine configuration
    pub config: StreamerConfig,

    /// Input file (None = stdin)
    pub input: Option<PathBuf>,

    /// Maximum number of records to write (None = unlimited)
    pub max_records: Option<u64>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Reads newline-delimited records and writes them through a streamer
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the input ends, the record limit is hit or `shutdown` fires
    ///
    /// The streamer is always closed before returning, so every record
    /// written has been handed to the sink (or reported as dropped).
    pub async fn run<F>(self, shutdown: F) -> Result<RunStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let source_name = self
            .config
            .input
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<stdin>".to_string());
        let reader = self.open_input(&source_name).await?;
        let mut lines = reader.lines();

        let streamer = create_streamer(&self.config.config, Arc::new(TracingLogger))
            .await
            .context("Failed to create streamer")?;

        info!(
            sink = %self.config.config.sink.name,
            workers = streamer.worker_count(),
            "Streamer started"
        );

        let mut stats = RunStats {
            sink_name: self.config.config.sink.name.clone(),
            workers: streamer.worker_count(),
            ..Default::default()
        };

        tokio::pin!(shutdown);
        let read_result: Result<(), CliError> = loop {
            if let Some(max) = self.config.max_records {
                if stats.records_written >= max {
                    info!(records = stats.records_written, "Reached max records limit");
                    break Ok(());
                }
            }

            let line = tokio::select! {
                biased;
                () = &mut shutdown => {
                    warn!("Received shutdown signal, closing streamer...");
                    stats.interrupted = true;
                    break Ok(());
                }
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(CliError::input(source_name.clone(), e)),
            };
            stats.records_read += 1;

            match streamer.write(line).await {
                Ok(()) => stats.records_written += 1,
                Err(StreamerError::InvalidRecord) => {
                    debug!(line = stats.records_read, "Skipping empty line");
                    stats.records_skipped += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Write rejected, stopping input");
                    break Ok(());
                }
            }
        };

        info!("Closing streamer...");
        streamer.close().await;

        stats.totals = MetricsSnapshot::total(&streamer.metrics());
        stats.flush = streamer.flush_summary();
        stats.duration = start_time.elapsed();

        info!(
            records_written = stats.records_written,
            records_flushed = stats.totals.records_flushed,
            records_dropped = stats.totals.records_dropped,
            duration_secs = stats.duration.as_secs_f64(),
            "Streamer closed"
        );

        read_result?;
        Ok(stats)
    }

    async fn open_input(
        &self,
        source_name: &str,
    ) -> Result<Box<dyn AsyncBufRead + Unpin + Send>, CliError> {
        match &self.config.input {
            Some(path) if path.as_os_str() != "-" => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| CliError::input(source_name, e))?;
                Ok(Box::new(BufReader::new(file)))
            }
            _ => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
        }
    }
}
