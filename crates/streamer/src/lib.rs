//! # Streamer
//!
//! Concurrent write-buffering engine.
//!
//! Responsibilities:
//! - Accept records from many concurrent writers
//! - Spread them round-robin over a fixed pool of batch workers
//! - Deliver batches to a shared [`Sink`] under a retry budget
//! - Flush on size, on time and on close, without losing admitted records

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod options;
pub mod retry;
pub mod sinks;
mod worker;

#[cfg(test)]
mod testing;

pub use contracts::{Record, Sink};
pub use dispatcher::EngineState;
pub use engine::Streamer;
pub use error::StreamerError;
pub use logger::{Logger, StdLogger, TracingLogger};
pub use metrics::{MetricsSnapshot, WorkerMetrics};
pub use options::{QueueCapacity, StreamerOptions};
pub use retry::{retry_with_budget, RetryPolicy};
pub use sinks::{create_sink, create_streamer, ConfiguredSink, FileSink, LogSink, NetworkSink};
