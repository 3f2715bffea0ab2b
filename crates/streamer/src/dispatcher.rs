//! Dispatcher - admission, routing and backpressure

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use contracts::Record;
use tokio::sync::oneshot;

use crate::error::StreamerError;
use crate::metrics::WorkerMetrics;
use crate::worker::Envelope;

/// Streamer lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    /// Accepting writes
    Open = 0,
    /// Close in progress, writes rejected
    Closing = 1,
    /// Workers stopped and sink closed
    Closed = 2,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Atomic holder of the [`EngineState`]
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(EngineState::Open as u8))
    }

    pub fn get(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from -> to`; false when the state was not `from`
    pub fn transition(&self, from: EngineState, to: EngineState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Sending side of one worker queue
pub(crate) struct Lane {
    pub index: usize,
    pub tx: async_channel::Sender<Envelope>,
    pub metrics: Arc<WorkerMetrics>,
}

/// Routes records to workers round-robin
///
/// The lane order is fixed at construction and never rebalanced.
pub(crate) struct Dispatcher {
    lanes: Vec<Lane>,
    next: AtomicUsize,
    synchronous: bool,
    state: Arc<StateCell>,
}

impl Dispatcher {
    pub fn new(lanes: Vec<Lane>, synchronous: bool, state: Arc<StateCell>) -> Self {
        Self {
            lanes,
            next: AtomicUsize::new(0),
            synchronous,
            state,
        }
    }

    /// Admit `record` and enqueue it on the next lane
    ///
    /// Waits while the lane is full, or until the worker took the record
    /// when the queues are synchronous.
    pub async fn dispatch(&self, record: Record) -> Result<(), StreamerError> {
        if record.is_empty() {
            return Err(StreamerError::InvalidRecord);
        }
        if self.state.get() != EngineState::Open {
            return Err(StreamerError::Closed);
        }

        let lane = self.select_lane();
        let (ack, taken) = if self.synchronous {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        // fails once close() closed the queue, including while blocked
        lane.tx
            .send(Envelope { record, ack })
            .await
            .map_err(|_| StreamerError::Closed)?;

        let depth = lane.tx.len();
        lane.metrics.inc_records_enqueued();
        lane.metrics.set_queue_len(depth);
        observability::record_record_enqueued(lane.index);
        observability::record_queue_depth(lane.index, depth);

        if let Some(taken) = taken {
            taken.await.map_err(|_| StreamerError::Closed)?;
        }
        Ok(())
    }

    fn select_lane(&self) -> &Lane {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.lanes.len();
        &self.lanes[slot]
    }

    /// Close every queue; queued records stay readable by the workers
    pub fn close(&self) {
        for lane in &self.lanes {
            lane.tx.close();
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }
}
