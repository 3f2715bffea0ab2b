//! Streamer construction options

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use contracts::{StreamerConfig, DEFAULT_MAX_BATCH_DELAY, DEFAULT_WORKER_QUEUE_SIZE};

use crate::logger::{Logger, StdLogger};
use crate::retry::RetryPolicy;

/// Per-worker queue capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueCapacity {
    /// Derived from the sink batch size
    #[default]
    Default,
    /// No buffering: `write` returns once the worker took the record
    Synchronous,
    /// Up to `n` records buffered per worker
    Bounded(usize),
}

impl QueueCapacity {
    /// `< 0` synchronous, `0` default, `n` bounded
    pub fn from_config_value(value: i32) -> Self {
        match value {
            n if n < 0 => Self::Synchronous,
            0 => Self::Default,
            n => Self::Bounded(n as usize),
        }
    }

    /// Queue slots for a sink with the given batch size; `0` is synchronous
    pub fn resolve(self, batch_size: usize) -> usize {
        match self {
            Self::Synchronous => 0,
            Self::Bounded(n) => n,
            Self::Default if batch_size > 1 => batch_size.div_ceil(2),
            Self::Default => DEFAULT_WORKER_QUEUE_SIZE,
        }
    }
}

/// Options for [`crate::Streamer::new`]
#[derive(Clone)]
pub struct StreamerOptions {
    /// Worker tasks; `0` is treated as one
    pub worker_count: usize,
    pub queue_capacity: QueueCapacity,
    /// Max time a batch stays open; zero means the default
    pub max_batch_delay: Duration,
    pub retry: RetryPolicy,
    pub logger: Arc<dyn Logger>,
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self {
            worker_count: 1,
            queue_capacity: QueueCapacity::Default,
            max_batch_delay: DEFAULT_MAX_BATCH_DELAY,
            retry: RetryPolicy::default(),
            logger: Arc::new(StdLogger),
        }
    }
}

impl fmt::Debug for StreamerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamerOptions")
            .field("worker_count", &self.worker_count)
            .field("queue_capacity", &self.queue_capacity)
            .field("max_batch_delay", &self.max_batch_delay)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl StreamerOptions {
    /// Options from a config file section (sanitized or not)
    pub fn from_config(config: &StreamerConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1) as usize,
            queue_capacity: QueueCapacity::from_config_value(config.worker_queue_size),
            max_batch_delay: config.max_batch_delay(),
            retry: RetryPolicy::from_config(&config.retry),
            logger: Arc::new(StdLogger),
        }
        .normalized()
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: QueueCapacity) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_max_batch_delay(mut self, max_batch_delay: Duration) -> Self {
        self.max_batch_delay = max_batch_delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Fill zero values with defaults
    pub fn normalized(mut self) -> Self {
        self.worker_count = self.worker_count.max(1);
        if self.max_batch_delay.is_zero() {
            self.max_batch_delay = DEFAULT_MAX_BATCH_DELAY;
        }
        self.retry = self.retry.normalized();
        self
    }
}
