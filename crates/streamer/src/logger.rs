//! Pluggable logger
//!
//! The streamer reports lifecycle events and delivery failures through a
//! [`Logger`] so callers can route them wherever they want. Implementations
//! are shared by every worker and must be safe for concurrent use.

use std::fmt;

/// Logger used by the streamer
pub trait Logger: Send + Sync {
    /// Log a debug message
    fn debug(&self, args: fmt::Arguments<'_>);

    /// Log an error message
    fn error(&self, args: fmt::Arguments<'_>);
}

/// Default logger: errors go to stderr, debug messages are ignored
#[derive(Debug, Clone, Copy, Default)]
pub struct StdLogger;

impl Logger for StdLogger {
    fn debug(&self, _args: fmt::Arguments<'_>) {}

    fn error(&self, args: fmt::Arguments<'_>) {
        eprintln!("{args}");
    }
}

/// Logger forwarding to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(target: "streamer", "{}", args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(target: "streamer", "{}", args);
    }
}
