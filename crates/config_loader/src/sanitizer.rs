//! Default filling
//!
//! Turns a user config (zeros meaning "default") into a config where every
//! knob carries its effective value. The input is never mutated; a new
//! config is returned.
//!
//! Rules:
//! - worker_count <= 0 -> 1
//! - sink.batch_size: 0 -> type default, < 0 -> 1
//! - worker_queue_size: < 0 -> -1 (synchronous hand-off),
//!   0 -> (batch_size + 1) / 2 for batching sinks, DEFAULT_WORKER_QUEUE_SIZE otherwise
//! - max_batch_delay_ms: 0 -> DEFAULT_MAX_BATCH_DELAY
//! - retry: zero fields take their defaults, max_attempts < 0 -> -1 (unlimited),
//!   multiplier <= 1 or non-finite -> DEFAULT_RETRY_DELAY_MULTIPLIER

use contracts::{
    RetryConfig, SinkConfig, StreamerConfig, DEFAULT_INITIAL_RETRY_DELAY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_BATCH_DELAY, DEFAULT_MAX_RETRY_DEADLINE_OFFSET, DEFAULT_RETRY_DELAY_MULTIPLIER,
    DEFAULT_WORKER_QUEUE_SIZE,
};

/// Queue size marking a synchronous hand-off once sanitized
pub const SYNCHRONOUS_QUEUE: i32 = -1;

/// Fill in defaults
pub fn sanitize(config: &StreamerConfig) -> StreamerConfig {
    let sink = sanitize_sink(&config.sink);
    let batch_size = sink.batch_size as usize;

    StreamerConfig {
        worker_count: config.worker_count.max(1),
        worker_queue_size: sanitize_queue_size(config.worker_queue_size, batch_size),
        max_batch_delay_ms: if config.max_batch_delay_ms == 0 {
            DEFAULT_MAX_BATCH_DELAY.as_millis() as u64
        } else {
            config.max_batch_delay_ms
        },
        retry: sanitize_retry(&config.retry),
        sink,
    }
}

fn sanitize_sink(sink: &SinkConfig) -> SinkConfig {
    SinkConfig {
        name: sink.name.clone(),
        sink_type: sink.sink_type,
        batch_size: sink.effective_batch_size().min(i32::MAX as usize) as i32,
        params: sink.params.clone(),
    }
}

fn sanitize_queue_size(queue_size: i32, batch_size: usize) -> i32 {
    match queue_size {
        n if n < 0 => SYNCHRONOUS_QUEUE,
        // batching sinks get half a batch of slack per worker
        0 if batch_size > 1 => ((batch_size + 1) / 2).min(i32::MAX as usize) as i32,
        0 => DEFAULT_WORKER_QUEUE_SIZE as i32,
        n => n,
    }
}

fn sanitize_retry(retry: &RetryConfig) -> RetryConfig {
    RetryConfig {
        max_attempts: match retry.max_attempts {
            n if n < 0 => -1,
            0 => DEFAULT_MAX_ATTEMPTS as i32,
            n => n,
        },
        initial_delay_ms: if retry.initial_delay_ms == 0 {
            DEFAULT_INITIAL_RETRY_DELAY.as_millis() as u64
        } else {
            retry.initial_delay_ms
        },
        multiplier: if retry.multiplier.is_finite() && retry.multiplier > 1.0 {
            retry.multiplier
        } else {
            DEFAULT_RETRY_DELAY_MULTIPLIER
        },
        max_deadline_offset_ms: if retry.max_deadline_offset_ms == 0 {
            DEFAULT_MAX_RETRY_DEADLINE_OFFSET.as_millis() as u64
        } else {
            retry.max_deadline_offset_ms
        },
    }
}
