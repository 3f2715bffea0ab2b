//! Streamer - the public coordinator of workers, dispatcher and sink

use std::sync::{Arc, Mutex};

use contracts::{Record, Sink};
use observability::FlushSummary;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::dispatcher::{Dispatcher, EngineState, Lane, StateCell};
use crate::error::StreamerError;
use crate::logger::Logger;
use crate::metrics::{merge_flush_stats, MetricsSnapshot, WorkerMetrics};
use crate::options::StreamerOptions;
use crate::worker::{WorkerHandle, WorkerSettings};

/// Concurrent write-buffering streamer
///
/// Records passed to [`Streamer::write`] are spread round-robin over a fixed
/// pool of workers, batched and delivered to the shared sink. [`Streamer::close`]
/// flushes every record admitted before it began.
///
/// Dropping a streamer without closing it stops the workers but never
/// calls the sink's `close`.
pub struct Streamer<S> {
    sink: Arc<S>,
    dispatcher: Dispatcher,
    state: Arc<StateCell>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<WorkerHandle>>,
    metrics: Vec<Arc<WorkerMetrics>>,
    logger: Arc<dyn Logger>,
}

impl<S> Streamer<S>
where
    S: Sink + Sync + 'static,
{
    /// Start the worker pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(sink: S, options: StreamerOptions) -> Self {
        let options = options.normalized();
        let sink = Arc::new(sink);
        let batch_size = sink.batch_size().max(1);
        let capacity = options.queue_capacity.resolve(batch_size);
        let synchronous = capacity == 0;

        let state = Arc::new(StateCell::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let settings = WorkerSettings {
            max_batch_delay: options.max_batch_delay,
            retry: options.retry.clone(),
            logger: Arc::clone(&options.logger),
        };

        let mut lanes = Vec::with_capacity(options.worker_count);
        let mut workers = Vec::with_capacity(options.worker_count);
        for index in 0..options.worker_count {
            // a one-slot queue plus an ack stands in for a zero-capacity channel
            let (tx, rx) = async_channel::bounded(capacity.max(1));
            let worker = WorkerHandle::spawn(
                index,
                Arc::clone(&sink),
                rx,
                shutdown_rx.clone(),
                settings.clone(),
            );
            lanes.push(Lane {
                index,
                tx,
                metrics: Arc::clone(&worker.metrics),
            });
            workers.push(worker);
        }

        let metrics = workers.iter().map(|w| Arc::clone(&w.metrics)).collect();

        info!(
            sink = %sink.name(),
            workers = options.worker_count,
            queue_capacity = capacity,
            batch_size,
            max_batch_delay_ms = options.max_batch_delay.as_millis() as u64,
            "Streamer started"
        );

        Self {
            dispatcher: Dispatcher::new(lanes, synchronous, Arc::clone(&state)),
            sink,
            state,
            shutdown,
            workers: Mutex::new(workers),
            metrics,
            logger: options.logger,
        }
    }

    /// Hand a record to the streamer
    ///
    /// Waits while the target worker's queue is full.
    ///
    /// # Errors
    /// - [`StreamerError::InvalidRecord`] for an empty record
    /// - [`StreamerError::Closed`] once [`Streamer::close`] began
    pub async fn write(&self, record: impl Into<Record>) -> Result<(), StreamerError> {
        self.dispatcher.dispatch(record.into()).await
    }

    /// Drain every worker, close the sink and stop
    ///
    /// Failures while draining or closing are logged, not returned.
    /// Calling it again is a no-op.
    #[instrument(name = "streamer_close", skip(self), fields(sink = %self.sink.name()))]
    pub async fn close(&self) {
        if !self
            .state
            .transition(EngineState::Open, EngineState::Closing)
        {
            self.logger
                .debug(format_args!("close called on a streamer that is not open"));
            return;
        }

        self.logger.debug(format_args!(
            "closing streamer with {} worker(s)",
            self.dispatcher.lane_count()
        ));

        self.dispatcher.close();
        self.shutdown.send_replace(true);

        let workers = self
            .workers
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default();

        let mut errors = Vec::new();
        for worker in workers {
            errors.extend(worker.join().await);
        }

        if let Err(e) = self.sink.close().await {
            errors.push(format!("sink '{}' close: {e}", self.sink.name()));
        }

        if let Some(err) = StreamerError::shutdown(&errors) {
            self.logger.error(format_args!("{err}"));
        }

        self.state
            .transition(EngineState::Closing, EngineState::Closed);

        let totals = MetricsSnapshot::total(&self.metrics());
        info!(
            records_flushed = totals.records_flushed,
            records_dropped = totals.records_dropped,
            errors = errors.len(),
            "Streamer closed"
        );
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    /// Per-worker metrics, in worker order
    pub fn metrics(&self) -> Vec<MetricsSnapshot> {
        self.metrics.iter().map(|m| m.snapshot()).collect()
    }

    /// Batch size and latency statistics across all workers
    pub fn flush_summary(&self) -> FlushSummary {
        merge_flush_stats(self.metrics.iter().map(Arc::as_ref))
    }

    pub fn worker_count(&self) -> usize {
        self.metrics.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
