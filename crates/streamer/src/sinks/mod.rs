//! Sink implementations
//!
//! Contains LogSink, FileSink and NetworkSink, plus [`create_sink`] which
//! builds one of them from a [`SinkConfig`].

mod file;
mod log;
mod network;

use std::sync::Arc;

use contracts::{ContractError, Record, Sink, SinkConfig, SinkType, StreamerConfig};
use tracing::info;

use crate::engine::Streamer;
use crate::error::StreamerError;
use crate::logger::Logger;
use crate::options::StreamerOptions;

pub use self::file::{FileSink, FileSinkConfig, DEFAULT_MAX_BUFFER_BYTES};
pub use self::log::LogSink;
pub use self::network::{NetworkFormat, NetworkSink, NetworkSinkConfig, DEFAULT_MAX_PACKET_SIZE};

/// A sink built from configuration
pub enum ConfiguredSink {
    Log(LogSink),
    File(FileSink),
    Network(NetworkSink),
}

impl ConfiguredSink {
    pub fn sink_type(&self) -> SinkType {
        match self {
            Self::Log(_) => SinkType::Log,
            Self::File(_) => SinkType::File,
            Self::Network(_) => SinkType::Network,
        }
    }
}

impl Sink for ConfiguredSink {
    fn name(&self) -> &str {
        match self {
            Self::Log(s) => s.name(),
            Self::File(s) => s.name(),
            Self::Network(s) => s.name(),
        }
    }

    fn batch_size(&self) -> usize {
        match self {
            Self::Log(s) => s.batch_size(),
            Self::File(s) => s.batch_size(),
            Self::Network(s) => s.batch_size(),
        }
    }

    async fn put(&self, batch: &[Record]) -> Result<bool, ContractError> {
        match self {
            Self::Log(s) => s.put(batch).await,
            Self::File(s) => s.put(batch).await,
            Self::Network(s) => s.put(batch).await,
        }
    }

    async fn flush(&self) -> Result<(), ContractError> {
        match self {
            Self::Log(s) => s.flush().await,
            Self::File(s) => s.flush().await,
            Self::Network(s) => s.flush().await,
        }
    }

    async fn close(&self) -> Result<(), ContractError> {
        match self {
            Self::Log(s) => s.close().await,
            Self::File(s) => s.close().await,
            Self::Network(s) => s.close().await,
        }
    }
}

/// Build the sink described by `config`
pub async fn create_sink(config: &SinkConfig) -> Result<ConfiguredSink, StreamerError> {
    let batch_size = config.effective_batch_size();
    let name = config.name.as_str();

    let sink = match config.sink_type {
        SinkType::Log => ConfiguredSink::Log(LogSink::with_batch_size(name, batch_size)),
        SinkType::File => ConfiguredSink::File(
            FileSink::from_params(name, &config.params, batch_size)
                .map_err(|e| StreamerError::sink_creation(name, e.to_string()))?,
        ),
        SinkType::Network => ConfiguredSink::Network(
            NetworkSink::from_params(name, &config.params, batch_size)
                .await
                .map_err(|e| StreamerError::sink_creation(name, e.to_string()))?,
        ),
    };

    info!(
        sink = %name,
        sink_type = ?config.sink_type,
        batch_size,
        "Sink created"
    );
    Ok(sink)
}

/// Build the configured sink and start a streamer over it
pub async fn create_streamer(
    config: &StreamerConfig,
    logger: Arc<dyn Logger>,
) -> Result<Streamer<ConfiguredSink>, StreamerError> {
    let sink = create_sink(&config.sink).await?;
    let options = StreamerOptions::from_config(config).with_logger(logger);
    Ok(Streamer::new(sink, options))
}
