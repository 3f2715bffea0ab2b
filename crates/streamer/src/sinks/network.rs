//! NetworkSink - UDP datagram streaming

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

use contracts::{ContractError, Record, Sink};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

/// Largest datagram payload sent by default
pub const DEFAULT_MAX_PACKET_SIZE: usize = 65000;

/// Serialization format for network transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// Newline-delimited JSON, records must be valid JSON
    #[default]
    Json,
    /// Bincode, length-prefixed raw bytes
    Bincode,
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Serialization format
    pub format: NetworkFormat,
    /// Max datagram size (UDP allows 65507 over IPv4)
    pub max_packet_size: usize,
    /// Records per put requested from the worker
    pub batch_size: usize,
}

impl NetworkSinkConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            format: NetworkFormat::Json,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            batch_size: 1,
        }
    }

    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>, batch_size: usize) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let format = match params.get("format").map(String::as_str) {
            Some("bincode") => NetworkFormat::Bincode,
            Some("json") | None => NetworkFormat::Json,
            Some(other) => return Err(format!("unknown format '{}'", other)),
        };

        let max_packet_size = match params.get("max_packet_size") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("invalid max_packet_size '{raw}'"))?,
            None => DEFAULT_MAX_PACKET_SIZE,
        };

        Ok(Self {
            addr,
            format,
            max_packet_size,
            batch_size: batch_size.max(1),
        })
    }
}

#[derive(Debug, Default)]
struct PendingFrames {
    frames: VecDeque<Vec<u8>>,
    bytes: usize,
}

/// Streaming sink sending records as UDP datagrams
///
/// Encoded frames are held until roughly one datagram worth of data is
/// pending or a flush is requested, then packed into as few datagrams as
/// `max_packet_size` allows.
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: UdpSocket,
    pending: Mutex<PendingFrames>,
}

impl NetworkSink {
    /// Create a new NetworkSink
    #[instrument(name = "network_sink_new", skip(name, config))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let bind_addr: SocketAddr = if config.addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(&config.addr).await?;

        debug!(
            sink = %name,
            target = %config.addr,
            format = ?config.format,
            "NetworkSink connected"
        );

        Ok(Self {
            name,
            config,
            socket,
            pending: Mutex::new(PendingFrames::default()),
        })
    }

    /// Create from params (for factory)
    #[instrument(name = "network_sink_from_params", skip(name, params))]
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
        batch_size: usize,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params, batch_size)
            .map_err(|e| ContractError::config_validation("sink.params", e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::sink_connection(name, e.to_string()))
    }

    pub fn target(&self) -> SocketAddr {
        self.config.addr
    }

    /// Frames waiting for the next transmission
    pub async fn pending_frames(&self) -> usize {
        self.pending.lock().await.frames.len()
    }

    fn encode(&self, record: &Record) -> Result<Vec<u8>, ContractError> {
        let frame = match self.config.format {
            NetworkFormat::Json => {
                serde_json::from_slice::<serde::de::IgnoredAny>(record.as_bytes()).map_err(|e| {
                    ContractError::sink_fatal(&self.name, format!("record is not JSON: {e}"))
                })?;
                record.as_bytes().to_vec()
            }
            NetworkFormat::Bincode => bincode::serialize(record)
                .map_err(|e| ContractError::sink_fatal(&self.name, format!("bincode error: {e}")))?,
        };

        if frame.len() > self.config.max_packet_size {
            return Err(ContractError::sink_fatal(
                &self.name,
                format!(
                    "frame of {} bytes exceeds max_packet_size {}",
                    frame.len(),
                    self.config.max_packet_size
                ),
            ));
        }
        Ok(frame)
    }

    fn separator(&self) -> &'static [u8] {
        match self.config.format {
            NetworkFormat::Json => b"\n",
            NetworkFormat::Bincode => b"",
        }
    }

    /// Send every pending frame; unsent frames stay pending on error
    async fn transmit(&self, pending: &mut PendingFrames) -> Result<(), ContractError> {
        let separator = self.separator();
        let mut packet = Vec::with_capacity(self.config.max_packet_size);

        while !pending.frames.is_empty() {
            packet.clear();
            let mut packed = 0;
            for frame in &pending.frames {
                let extra = if packed == 0 { 0 } else { separator.len() };
                if packed > 0 && packet.len() + extra + frame.len() > self.config.max_packet_size {
                    break;
                }
                if packed > 0 {
                    packet.extend_from_slice(separator);
                }
                packet.extend_from_slice(frame);
                packed += 1;
            }

            if let Err(e) = self.socket.send(&packet).await {
                error!(sink = %self.name, error = %e, "UDP send failed");
                return Err(ContractError::sink_connection(&self.name, e.to_string()));
            }
            debug!(sink = %self.name, frames = packed, bytes = packet.len(), "Datagram sent");

            for frame in pending.frames.drain(..packed) {
                pending.bytes -= frame.len();
            }
        }
        Ok(())
    }
}

impl Sink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    #[instrument(
        name = "network_sink_put",
        skip(self, batch),
        fields(sink = %self.name, records = batch.len())
    )]
    async fn put(&self, batch: &[Record]) -> Result<bool, ContractError> {
        // encode everything first so a bad record leaves nothing half-queued
        let frames = batch
            .iter()
            .map(|record| self.encode(record))
            .collect::<Result<Vec<_>, _>>()?;

        let mut pending = self.pending.lock().await;
        for frame in frames {
            pending.bytes += frame.len();
            pending.frames.push_back(frame);
        }

        if pending.bytes < self.config.max_packet_size {
            return Ok(false);
        }

        // the frames are queued now; unsent ones wait for the next flush
        match self.transmit(&mut pending).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(
                    sink = %self.name,
                    error = %e,
                    pending = pending.frames.len(),
                    "Transmission deferred to next flush"
                );
                Ok(false)
            }
        }
    }

    #[instrument(name = "network_sink_flush", skip(self))]
    async fn flush(&self) -> Result<(), ContractError> {
        let mut pending = self.pending.lock().await;
        self.transmit(&mut pending).await
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        let pending = self.pending.lock().await;
        if !pending.frames.is_empty() {
            return Err(ContractError::sink_fatal(
                &self.name,
                format!("closed with {} unsent frame(s)", pending.frames.len()),
            ));
        }
        debug!(sink = %self.name, "NetworkSink closed");
        Ok(())
    }
}
