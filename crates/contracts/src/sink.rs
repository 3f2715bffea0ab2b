//! Sink trait - engine output interface
//!
//! Defines the abstract capability set every ingestion backend implements.

use crate::{ContractError, Record};

/// Bulk-ingestion sink
///
/// One instance is shared by every worker of a streamer, so implementations
/// must tolerate concurrent `put` / `flush` calls (methods take `&self`).
#[trait_variant::make(Sink: Send)]
pub trait LocalSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Number of records the worker should accumulate before calling `put`.
    ///
    /// `1` means the sink streams: every record is handed over on its own
    /// and buffering is left to the sink, flushed on the worker's timer.
    fn batch_size(&self) -> usize;

    /// Hand a batch to the sink
    ///
    /// Returns `true` when the sink already delivered its buffered data as a
    /// side effect of this call, so no explicit `flush` is needed.
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn put(&self, batch: &[Record]) -> Result<bool, ContractError>;

    /// Deliver any internally buffered data
    async fn flush(&self) -> Result<(), ContractError>;

    /// Release sink resources; called once after every worker stopped
    async fn close(&self) -> Result<(), ContractError>;
}
