//! LogSink - logs batch summaries via tracing

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{ContractError, Record, Sink, DEFAULT_BATCH_SIZE};
use tracing::{info, instrument};

/// Longest record preview included in a batch summary
const PREVIEW_LEN: usize = 64;

/// Batching sink that logs every batch it receives
///
/// Each put is delivered on the spot, so it always reports a flush.
pub struct LogSink {
    name: String,
    batch_size: usize,
    records: AtomicU64,
    batches: AtomicU64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_batch_size(name, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(name: impl Into<String>, batch_size: usize) -> Self {
        Self {
            name: name.into(),
            batch_size: batch_size.max(1),
            records: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        }
    }

    /// Records logged so far
    pub fn records_logged(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    pub fn batches_logged(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    fn log_batch_summary(&self, batch: &[Record]) {
        let bytes: usize = batch.iter().map(Record::len).sum();
        let first = batch.first().map(preview).unwrap_or_default();

        info!(
            sink = %self.name,
            records = batch.len(),
            bytes,
            first = %first,
            "Batch received"
        );
    }
}

fn preview(record: &Record) -> String {
    match record.as_str() {
        Some(text) if text.len() <= PREVIEW_LEN => text.to_string(),
        Some(text) => {
            let cut = (0..=PREVIEW_LEN)
                .rev()
                .find(|&i| text.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}...", &text[..cut])
        }
        None => format!("<{} binary bytes>", record.len()),
    }
}

impl Sink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[instrument(
        name = "log_sink_put",
        skip(self, batch),
        fields(sink = %self.name, records = batch.len())
    )]
    async fn put(&self, batch: &[Record]) -> Result<bool, ContractError> {
        self.log_batch_summary(batch);
        self.records
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&self) -> Result<(), ContractError> {
        // puts are never buffered
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            records = self.records_logged(),
            batches = self.batches_logged(),
            "LogSink closed"
        );
        Ok(())
    }
}
