//! Run statistics.

use std::time::Duration;

use observability::FlushSummary;
use streamer::MetricsSnapshot;

/// Statistics from one `run`
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Sink the records were delivered to
    pub sink_name: String,

    /// Worker pool size
    pub workers: usize,

    /// Lines read from the input
    pub records_read: u64,

    /// Records accepted by the streamer
    pub records_written: u64,

    /// Empty lines
    pub records_skipped: u64,

    /// Input stopped by a shutdown signal
    pub interrupted: bool,

    /// Wall time including the final close
    pub duration: Duration,

    /// Worker counters summed over the pool
    pub totals: MetricsSnapshot,

    /// Batch size and flush latency statistics
    pub flush: FlushSummary,
}

impl RunStats {
    /// Records accepted per second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.records_written as f64 / secs
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Run Statistics ===\n");

        println!("Overview");
        println!("  Sink: {}", self.sink_name);
        println!("  Workers: {}", self.workers);
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Records read: {}", self.records_read);
        println!("  Records written: {}", self.records_written);
        println!("  Empty lines skipped: {}", self.records_skipped);
        println!("  Throughput: {:.2} records/s", self.throughput());
        if self.interrupted {
            println!("  Stopped by signal");
        }

        println!("\nDelivery");
        println!("  Records flushed: {}", self.totals.records_flushed);
        println!("  Batches flushed: {}", self.totals.batches_flushed);
        println!("  Explicit flushes: {}", self.totals.explicit_flushes);
        println!("  Retries: {}", self.totals.retries);
        println!("  Failed sink calls: {}", self.totals.failures);
        println!("  Records dropped: {}", self.totals.records_dropped);

        println!("\n{}", self.flush);
    }
}
