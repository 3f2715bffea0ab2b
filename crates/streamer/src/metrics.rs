//! Per-worker metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use observability::{FlushStatsAggregator, FlushSummary};

/// Metrics for a single worker
///
/// Counters are written by the owning worker (and the dispatcher for
/// `records_enqueued`) and read by anyone holding the streamer.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Records waiting in the queue, sampled on enqueue/dequeue
    queue_len: AtomicUsize,
    /// Records accepted into the queue
    records_enqueued: AtomicU64,
    /// Records delivered through a successful put
    records_flushed: AtomicU64,
    /// Successful puts
    batches_flushed: AtomicU64,
    /// Successful explicit flush calls
    explicit_flushes: AtomicU64,
    /// Sink calls repeated after a failure
    retries: AtomicU64,
    /// Sink operations that ran out of budget
    failures: AtomicU64,
    /// Batches dropped after a failed put
    batches_dropped: AtomicU64,
    /// Records in dropped batches
    records_dropped: AtomicU64,
    /// Batch size / latency statistics
    flush_stats: Mutex<FlushStatsAggregator>,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn records_enqueued(&self) -> u64 {
        self.records_enqueued.load(Ordering::Relaxed)
    }

    pub fn inc_records_enqueued(&self) {
        self.records_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_flushed(&self) -> u64 {
        self.records_flushed.load(Ordering::Relaxed)
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    /// Record a successful put of `records` records
    pub fn record_batch_flushed(&self, records: usize, latency_ms: f64, retries: u64) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.records_flushed
            .fetch_add(records as u64, Ordering::Relaxed);
        if let Ok(mut stats) = self.flush_stats.lock() {
            stats.record_success(records, latency_ms, retries);
        }
    }

    pub fn explicit_flushes(&self) -> u64 {
        self.explicit_flushes.load(Ordering::Relaxed)
    }

    pub fn inc_explicit_flushes(&self) {
        self.explicit_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn add_retries(&self, retries: u64) {
        self.retries.fetch_add(retries, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    /// Record a batch given up on
    pub fn record_batch_dropped(&self, records: usize, retries: u64) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.records_dropped
            .fetch_add(records as u64, Ordering::Relaxed);
        if let Ok(mut stats) = self.flush_stats.lock() {
            stats.record_failure(records, retries);
        }
    }

    /// Copy of the flush statistics
    pub fn flush_stats(&self) -> FlushStatsAggregator {
        self.flush_stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            records_enqueued: self.records_enqueued(),
            records_flushed: self.records_flushed(),
            batches_flushed: self.batches_flushed(),
            explicit_flushes: self.explicit_flushes(),
            retries: self.retries(),
            failures: self.failures(),
            batches_dropped: self.batches_dropped(),
            records_dropped: self.records_dropped(),
        }
    }
}

/// Snapshot of worker metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub records_enqueued: u64,
    pub records_flushed: u64,
    pub batches_flushed: u64,
    pub explicit_flushes: u64,
    pub retries: u64,
    pub failures: u64,
    pub batches_dropped: u64,
    pub records_dropped: u64,
}

impl MetricsSnapshot {
    /// Sum snapshots of several workers
    pub fn total<'a>(snapshots: impl IntoIterator<Item = &'a MetricsSnapshot>) -> Self {
        snapshots
            .into_iter()
            .fold(Self::default(), |acc, s| MetricsSnapshot {
                queue_len: acc.queue_len + s.queue_len,
                records_enqueued: acc.records_enqueued + s.records_enqueued,
                records_flushed: acc.records_flushed + s.records_flushed,
                batches_flushed: acc.batches_flushed + s.batches_flushed,
                explicit_flushes: acc.explicit_flushes + s.explicit_flushes,
                retries: acc.retries + s.retries,
                failures: acc.failures + s.failures,
                batches_dropped: acc.batches_dropped + s.batches_dropped,
                records_dropped: acc.records_dropped + s.records_dropped,
            })
    }
}

/// Merge the flush statistics of several workers into one summary
pub fn merge_flush_stats<'a>(metrics: impl IntoIterator<Item = &'a WorkerMetrics>) -> FlushSummary {
    let mut merged = FlushStatsAggregator::new();
    for worker in metrics {
        merged.merge(&worker.flush_stats());
    }
    merged.summary()
}
