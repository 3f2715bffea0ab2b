//! Streamer error types

use thiserror::Error;

/// Streamer-specific errors
#[derive(Debug, Error)]
pub enum StreamerError {
    /// Write attempted once the streamer stopped accepting records
    #[error("streamer is closed")]
    Closed,

    /// Empty record handed to `write`
    #[error("invalid record: records must not be empty")]
    InvalidRecord,

    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// One or more workers or the sink failed during shutdown
    #[error("shutdown completed with {count} error(s): {summary}")]
    Shutdown { count: usize, summary: String },
}

impl StreamerError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Fold a list of shutdown failures into one error, `None` when empty
    pub fn shutdown(errors: &[String]) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        Some(Self::Shutdown {
            count: errors.len(),
            summary: errors.join("; "),
        })
    }
}
