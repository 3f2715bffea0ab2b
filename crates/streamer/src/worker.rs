//! Batch worker - owns one record queue and one in-progress batch
//!
//! ```text
//! Idle -> Accumulating -> Flushing -> Idle ... -> Draining -> Stopped
//! ```
//!
//! The worker waits on three events at once: the next record, the batch
//! timer and the shutdown signal. A full batch is put right away; the timer
//! puts whatever is pending and then flushes the sink explicitly unless that
//! put already flushed. On shutdown the queue is drained, the residual batch
//! is put and a final explicit flush is issued.

use std::sync::Arc;
use std::time::Duration;

use contracts::{ContractError, Record, Sink};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument};

use crate::logger::Logger;
use crate::metrics::WorkerMetrics;
use crate::retry::{retry_with_budget, RetryPolicy};

/// Upper bound on the batch buffer preallocation
const MAX_BATCH_PREALLOC: usize = 1024;

/// A record travelling through a worker queue
pub(crate) struct Envelope {
    pub record: Record,
    /// Completed when the worker takes the record (synchronous hand-off)
    pub ack: Option<oneshot::Sender<()>>,
}

/// Settings shared by every worker of a streamer
#[derive(Clone)]
pub(crate) struct WorkerSettings {
    pub max_batch_delay: Duration,
    pub retry: RetryPolicy,
    pub logger: Arc<dyn Logger>,
}

/// Handle to a running worker task
pub(crate) struct WorkerHandle {
    pub index: usize,
    pub metrics: Arc<WorkerMetrics>,
    join: JoinHandle<Vec<ContractError>>,
}

impl WorkerHandle {
    /// Spawn a worker task reading from `rx`
    pub fn spawn<S>(
        index: usize,
        sink: Arc<S>,
        rx: async_channel::Receiver<Envelope>,
        shutdown: watch::Receiver<bool>,
        settings: WorkerSettings,
    ) -> Self
    where
        S: Sink + Sync + 'static,
    {
        let metrics = Arc::new(WorkerMetrics::new());
        let batch_size = sink.batch_size().max(1);

        let worker = BatchWorker {
            index,
            batch: Vec::with_capacity(batch_size.min(MAX_BATCH_PREALLOC)),
            batch_size,
            sink,
            rx,
            shutdown,
            max_batch_delay: settings.max_batch_delay,
            retry: settings.retry,
            logger: settings.logger,
            metrics: Arc::clone(&metrics),
        };

        let join = tokio::spawn(worker.run());

        Self {
            index,
            metrics,
            join,
        }
    }

    /// Wait for the worker to stop; returns the errors hit while draining
    pub async fn join(self) -> Vec<String> {
        match self.join.await {
            Ok(errors) => errors
                .into_iter()
                .map(|e| format!("worker {}: {e}", self.index))
                .collect(),
            Err(e) => vec![format!("worker {} terminated abnormally: {e}", self.index)],
        }
    }
}

struct BatchWorker<S> {
    index: usize,
    batch: Vec<Record>,
    batch_size: usize,
    sink: Arc<S>,
    rx: async_channel::Receiver<Envelope>,
    shutdown: watch::Receiver<bool>,
    max_batch_delay: Duration,
    retry: RetryPolicy,
    logger: Arc<dyn Logger>,
    metrics: Arc<WorkerMetrics>,
}

impl<S> BatchWorker<S>
where
    S: Sink + Sync + 'static,
{
    #[instrument(
        name = "batch_worker_loop",
        skip_all,
        fields(worker = self.index, sink = %self.sink.name(), batch_size = self.batch_size)
    )]
    async fn run(mut self) -> Vec<ContractError> {
        self.logger
            .debug(format_args!("worker {} started", self.index));

        let timer = sleep(self.max_batch_delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Ok(envelope) => {
                        self.accept(envelope);
                        if self.batch.len() >= self.batch_size {
                            // the sink emptied its buffer, so a new window opens
                            if let Ok(true) = self.put_batch().await {
                                timer.as_mut().reset(Instant::now() + self.max_batch_delay);
                            }
                        }
                    }
                    // closed and empty
                    Err(_) => break,
                },
                () = &mut timer => {
                    self.on_timer().await;
                    timer.as_mut().reset(Instant::now() + self.max_batch_delay);
                }
                _ = self.shutdown.changed() => break,
            }
        }

        self.drain().await
    }

    fn accept(&mut self, envelope: Envelope) {
        self.batch.push(envelope.record);
        if let Some(ack) = envelope.ack {
            let _ = ack.send(());
        }
        self.metrics.set_queue_len(self.rx.len());
    }

    async fn on_timer(&mut self) {
        let pending = self.batch.len();
        let did_flush = matches!(self.put_batch().await, Ok(true));
        if !did_flush {
            let _ = self.flush().await;
        }
        debug!(worker = self.index, pending, did_flush, "Batch timer fired");
    }

    /// Put the current batch through the retry budget
    ///
    /// The batch is cleared either way; on error it is dropped and logged.
    async fn put_batch(&mut self) -> Result<bool, ContractError> {
        if self.batch.is_empty() {
            return Ok(false);
        }

        let batch = std::mem::replace(
            &mut self.batch,
            Vec::with_capacity(self.batch_size.min(MAX_BATCH_PREALLOC)),
        );
        let sink = &*self.sink;
        let records = batch.as_slice();
        let mut calls: u64 = 0;
        let started = Instant::now();

        let result = retry_with_budget(&self.retry, || {
            calls += 1;
            sink.put(records)
        })
        .await;

        let retries = calls.saturating_sub(1);
        self.metrics.add_retries(retries);
        observability::record_retries(sink.name(), retries);

        match result {
            Ok(did_flush) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.metrics
                    .record_batch_flushed(records.len(), latency_ms, retries);
                observability::record_batch_flushed(sink.name(), records.len(), latency_ms);
                Ok(did_flush)
            }
            Err(err) => {
                self.metrics.inc_failures();
                self.metrics.record_batch_dropped(records.len(), retries);
                observability::record_batch_dropped(sink.name(), records.len());
                self.logger.error(format_args!(
                    "worker {}: dropping batch of {} record(s) for sink '{}' after {} attempt(s): {}",
                    self.index,
                    records.len(),
                    sink.name(),
                    calls,
                    err
                ));
                Err(err)
            }
        }
    }

    /// Explicit sink flush through the retry budget
    async fn flush(&mut self) -> Result<(), ContractError> {
        let sink = &*self.sink;
        let mut calls: u64 = 0;

        let result = retry_with_budget(&self.retry, || {
            calls += 1;
            sink.flush()
        })
        .await;

        let retries = calls.saturating_sub(1);
        self.metrics.add_retries(retries);
        observability::record_retries(sink.name(), retries);
        observability::record_explicit_flush(sink.name(), result.is_ok());

        match result {
            Ok(()) => {
                self.metrics.inc_explicit_flushes();
                Ok(())
            }
            Err(err) => {
                self.metrics.inc_failures();
                self.logger.error(format_args!(
                    "worker {}: flush of sink '{}' failed after {} attempt(s): {}",
                    self.index,
                    sink.name(),
                    calls,
                    err
                ));
                Err(err)
            }
        }
    }

    /// Take every queued record, put the residual batch, flush, stop
    async fn drain(mut self) -> Vec<ContractError> {
        self.logger
            .debug(format_args!("worker {} draining", self.index));

        let mut errors = Vec::new();
        let mut drained: usize = 0;

        while let Ok(envelope) = self.rx.try_recv() {
            drained += 1;
            self.accept(envelope);
            if self.batch.len() >= self.batch_size {
                if let Err(err) = self.put_batch().await {
                    errors.push(err);
                }
            }
        }

        if let Err(err) = self.put_batch().await {
            errors.push(err);
        }
        if let Err(err) = self.flush().await {
            errors.push(err);
        }

        self.metrics.set_queue_len(0);
        debug!(
            worker = self.index,
            drained,
            errors = errors.len(),
            "Worker stopped"
        );
        self.logger
            .debug(format_args!("worker {} stopped", self.index));
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::tests::CaptureLogger;
    use crate::testing::StubSink;

    fn settings(delay_ms: u64, logger: Arc<dyn Logger>) -> WorkerSettings {
        WorkerSettings {
            max_batch_delay: Duration::from_millis(delay_ms),
            retry: RetryPolicy::new(
                Some(3),
                Duration::from_millis(5),
                1.5,
                Duration::from_secs(2),
            ),
            logger,
        }
    }

    async fn send(tx: &async_channel::Sender<Envelope>, value: &str) {
        tx.send(Envelope {
            record: Record::from(value),
            ack: None,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_batches_of_exact_size() {
        let sink = Arc::new(StubSink::batching(3));
        let (tx, rx) = async_channel::bounded(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = WorkerHandle::spawn(
            0,
            Arc::clone(&sink),
            rx,
            shutdown_rx,
            settings(10_000, Arc::new(CaptureLogger::default())),
        );

        for i in 0..7 {
            send(&tx, &format!("r{i}")).await;
        }
        tx.close();
        shutdown_tx.send_replace(true);
        assert!(handle.join().await.is_empty());

        assert_eq!(sink.put_sizes(), vec![3, 3, 1]);
        assert_eq!(
            sink.rows(),
            vec!["r0", "r1", "r2", "r3", "r4", "r5", "r6"]
        );
    }

    #[tokio::test]
    async fn test_timer_flushes_partial_batch() {
        let sink = Arc::new(StubSink::batching(100));
        let (tx, rx) = async_channel::bounded(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = WorkerHandle::spawn(
            0,
            Arc::clone(&sink),
            rx,
            shutdown_rx,
            settings(50, Arc::new(CaptureLogger::default())),
        );

        send(&tx, "a").await;
        send(&tx, "b").await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(sink.rows(), vec!["a", "b"]);
        assert!(sink.flush_count() >= 1);

        tx.close();
        shutdown_tx.send_replace(true);
        handle.join().await;
    }

    #[tokio::test]
    async fn test_trickle_does_not_postpone_timer() {
        let sink = Arc::new(StubSink::batching(1000));
        let (tx, rx) = async_channel::bounded(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let started = Instant::now();
        let handle = WorkerHandle::spawn(
            0,
            Arc::clone(&sink),
            rx,
            shutdown_rx,
            settings(150, Arc::new(CaptureLogger::default())),
        );

        // one record every d/3 for about 3d
        for i in 0..9 {
            send(&tx, &format!("t{i}")).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let put_times = sink.put_times();

        assert!(put_times.len() >= 2, "puts during trickle: {}", put_times.len());
        let first = put_times[0].duration_since(started);
        assert!(first < Duration::from_millis(260), "first put after {first:?}");

        tx.close();
        shutdown_tx.send_replace(true);
        handle.join().await;
        assert_eq!(sink.rows().len(), 9);
    }

    #[tokio::test]
    async fn test_flush_on_put_skips_explicit_flush() {
        let sink = Arc::new(StubSink::batching(100));
        let (tx, rx) = async_channel::bounded(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = WorkerHandle::spawn(
            0,
            Arc::clone(&sink),
            rx,
            shutdown_rx,
            settings(80, Arc::new(CaptureLogger::default())),
        );

        sink.flush_next_put();
        send(&tx, "a").await;
        // first tick: the put reports a flush, so no explicit one follows
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(sink.rows(), vec!["a"]);
        assert_eq!(sink.flush_count(), 1);
        assert_eq!(handle.metrics.explicit_flushes(), 0);

        tx.close();
        shutdown_tx.send_replace(true);
        handle.join().await;
    }

    #[tokio::test]
    async fn test_exhausted_batch_is_dropped_and_logged() {
        let sink = Arc::new(StubSink::batching(2));
        for _ in 0..3 {
            sink.add_next_error(ContractError::sink_write("stub", "down"));
        }
        let logger = Arc::new(CaptureLogger::default());
        let (tx, rx) = async_channel::bounded(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = WorkerHandle::spawn(
            0,
            Arc::clone(&sink),
            rx,
            shutdown_rx,
            settings(10_000, logger.clone()),
        );
        let metrics = Arc::clone(&handle.metrics);

        send(&tx, "lost-1").await;
        send(&tx, "lost-2").await;
        // let the failing put run its budget before shutdown
        tokio::time::sleep(Duration::from_millis(200)).await;
        send(&tx, "kept").await;
        tx.close();
        shutdown_tx.send_replace(true);
        let errors = handle.join().await;

        assert!(errors.is_empty());
        assert_eq!(sink.rows(), vec!["kept"]);
        assert_eq!(metrics.batches_dropped(), 1);
        assert_eq!(metrics.records_dropped(), 2);
        assert_eq!(metrics.retries(), 2);
        assert!(logger.errors()[0].contains("dropping batch of 2 record(s)"));
    }

    #[tokio::test]
    async fn test_drain_errors_are_reported() {
        let sink = Arc::new(StubSink::batching(10));
        let (tx, rx) = async_channel::bounded(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut worker_settings = settings(10_000, Arc::new(CaptureLogger::default()));
        worker_settings.retry = RetryPolicy::no_retry();
        let handle = WorkerHandle::spawn(0, Arc::clone(&sink), rx, shutdown_rx, worker_settings);

        send(&tx, "x").await;
        sink.add_next_error(ContractError::sink_fatal("stub", "rejected"));
        tx.close();
        shutdown_tx.send_replace(true);

        let errors = handle.join().await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("worker 0:"));
        assert!(sink.rows().is_empty());
    }

    #[tokio::test]
    async fn test_synchronous_ack() {
        let sink = Arc::new(StubSink::streaming());
        let (tx, rx) = async_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = WorkerHandle::spawn(
            0,
            Arc::clone(&sink),
            rx,
            shutdown_rx,
            settings(10_000, Arc::new(CaptureLogger::default())),
        );

        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(Envelope {
            record: Record::from("sync"),
            ack: Some(ack_tx),
        })
        .await
        .unwrap();
        ack_rx.await.unwrap();

        tx.close();
        shutdown_tx.send_replace(true);
        handle.join().await;
        assert_eq!(sink.rows(), vec!["sync"]);
    }
}
