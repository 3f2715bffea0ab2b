//! FileSink - buffers records and writes them as load files on disk

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use contracts::{ContractError, Record, Sink};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

/// Buffer size that makes a put write its own segment
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output directory
    pub base_path: PathBuf,
    /// Records per put requested from the worker
    pub batch_size: usize,
    /// A put that grows the buffer past this writes a segment itself
    pub max_buffer_bytes: usize,
}

impl FileSinkConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            batch_size: 1,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }

    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>, batch_size: usize) -> Result<Self, String> {
        let base_path = params
            .get("base_path")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing 'base_path' parameter".to_string())?;

        let max_buffer_bytes = match params.get("max_buffer_bytes") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("invalid max_buffer_bytes '{raw}'"))?,
            None => DEFAULT_MAX_BUFFER_BYTES,
        };

        Ok(Self {
            base_path: PathBuf::from(base_path),
            batch_size: batch_size.max(1),
            max_buffer_bytes,
        })
    }
}

#[derive(Debug, Default)]
struct SegmentBuffer {
    data: Vec<u8>,
    records: usize,
    next_segment: u64,
}

/// Streaming sink writing newline-delimited segments
///
/// Puts append to an in-memory buffer; a flush writes the buffer to a new
/// segment file (temp file + rename) so readers never see partial segments.
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    buffer: Mutex<SegmentBuffer>,
}

impl FileSink {
    /// Create a new FileSink, creating the output directory
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            buffer: Mutex::new(SegmentBuffer::default()),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
        batch_size: usize,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = FileSinkConfig::from_params(params, batch_size)
            .map_err(|e| ContractError::config_validation("sink.params", e))?;
        Ok(Self::new(name, config)?)
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Bytes waiting for the next segment
    pub async fn buffered_bytes(&self) -> usize {
        self.buffer.lock().await.data.len()
    }

    fn segment_path(&self, segment: u64) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        self.config
            .base_path
            .join(format!("{}-{stamp}-{segment:06}.ndjson", self.name))
    }

    /// Write the buffer to a new segment; the buffer is kept on failure
    async fn write_segment(&self, buffer: &mut SegmentBuffer) -> Result<(), ContractError> {
        if buffer.data.is_empty() {
            return Ok(());
        }

        let path = self.segment_path(buffer.next_segment);
        let tmp = path.with_extension("ndjson.tmp");

        let written = async {
            tokio::fs::write(&tmp, &buffer.data).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            error!(sink = %self.name, path = %path.display(), error = %e, "Segment write failed");
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ContractError::sink_write(&self.name, e.to_string()));
        }

        debug!(
            sink = %self.name,
            path = %path.display(),
            records = buffer.records,
            bytes = buffer.data.len(),
            "Segment written"
        );
        buffer.data.clear();
        buffer.records = 0;
        buffer.next_segment += 1;
        Ok(())
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    #[instrument(
        name = "file_sink_put",
        skip(self, batch),
        fields(sink = %self.name, records = batch.len())
    )]
    async fn put(&self, batch: &[Record]) -> Result<bool, ContractError> {
        let mut buffer = self.buffer.lock().await;
        for record in batch {
            buffer.data.extend_from_slice(record.as_bytes());
            buffer.data.push(b'\n');
        }
        buffer.records += batch.len();

        if buffer.data.len() < self.config.max_buffer_bytes {
            return Ok(false);
        }

        // the batch is buffered now; a failed write is left to the next flush
        match self.write_segment(&mut buffer).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(
                    sink = %self.name,
                    error = %e,
                    buffered = buffer.records,
                    "Segment write deferred to next flush"
                );
                Ok(false)
            }
        }
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&self) -> Result<(), ContractError> {
        let mut buffer = self.buffer.lock().await;
        self.write_segment(&mut buffer).await
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        let buffer = self.buffer.lock().await;
        if !buffer.data.is_empty() {
            return Err(ContractError::sink_fatal(
                &self.name,
                format!("closed with {} unflushed record(s)", buffer.records),
            ));
        }
        debug!(sink = %self.name, segments = buffer.next_segment, "FileSink closed");
        Ok(())
    }
}
