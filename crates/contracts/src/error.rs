//! Layered error definitions
//!
//! Categorized by source: config / record / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Record Errors =====
    /// Record could not be encoded
    #[error("record encode error: {message}")]
    RecordEncode { message: String },

    // ===== Sink Errors =====
    /// Sink write error, transient
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error, transient
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    /// Sink rejected the data, retrying cannot help
    #[error("sink '{sink_name}' rejected data: {message}")]
    SinkFatal { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink connection error
    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create non-retryable sink error
    pub fn sink_fatal(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkFatal {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether another attempt at the same sink call may succeed.
    ///
    /// Write, connection and io failures are treated as transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SinkWrite { .. } | Self::SinkConnection { .. } | Self::Io(_) | Self::Other(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ContractError::sink_write("s", "timeout").is_retryable());
        assert!(ContractError::sink_connection("s", "refused").is_retryable());
        assert!(ContractError::Io(std::io::Error::other("disk")).is_retryable());

        assert!(!ContractError::sink_fatal("s", "bad row").is_retryable());
        assert!(!ContractError::config_validation("sink.name", "empty").is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = ContractError::sink_write("events", "quota exceeded");
        assert_eq!(
            err.to_string(),
            "sink 'events' write error: quota exceeded"
        );
    }
}
