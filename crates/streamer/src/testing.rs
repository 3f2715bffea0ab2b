//! In-memory sink for unit tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use contracts::{ContractError, Record, Sink};
use tokio::time::Instant;

#[derive(Default)]
struct StubState {
    rows: Vec<String>,
    put_sizes: Vec<usize>,
    put_times: Vec<Instant>,
    flush_count: usize,
    close_count: usize,
    flush_next_put: bool,
    next_errors: VecDeque<ContractError>,
}

/// Sink keeping every record in memory
///
/// Queued errors are consumed by the next put, flush or close, whichever
/// comes first.
pub(crate) struct StubSink {
    batch_size: usize,
    put_delay: Duration,
    state: Mutex<StubState>,
}

impl StubSink {
    pub fn streaming() -> Self {
        Self::batching(1)
    }

    pub fn batching(batch_size: usize) -> Self {
        Self {
            batch_size,
            put_delay: Duration::ZERO,
            state: Mutex::new(StubState::default()),
        }
    }

    /// Every put sleeps this long before storing its batch
    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    pub fn add_next_error(&self, err: ContractError) {
        self.state.lock().unwrap().next_errors.push_back(err);
    }

    /// Next successful put also flushes and reports it
    pub fn flush_next_put(&self) {
        self.state.lock().unwrap().flush_next_put = true;
    }

    pub fn rows(&self) -> Vec<String> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn put_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().put_sizes.clone()
    }

    /// When each successful put started storing its batch
    pub fn put_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().put_times.clone()
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().unwrap().flush_count
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().close_count
    }

    /// Poll until `n` rows arrived or `timeout` passed
    pub async fn wait_for_rows(&self, n: usize, timeout: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let rows = self.rows();
            if rows.len() >= n || tokio::time::Instant::now() >= deadline {
                return rows;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn take_error(state: &mut StubState) -> Result<(), ContractError> {
        match state.next_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Sink for StubSink {
    fn name(&self) -> &str {
        "stub"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn put(&self, batch: &[Record]) -> Result<bool, ContractError> {
        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }
        let mut state = self.state.lock().unwrap();
        Self::take_error(&mut state)?;
        state.put_sizes.push(batch.len());
        state.put_times.push(Instant::now());
        state.rows.extend(
            batch
                .iter()
                .map(|r| r.as_str().unwrap_or_default().to_string()),
        );
        if std::mem::take(&mut state.flush_next_put) {
            state.flush_count += 1;
            return Ok(true);
        }
        Ok(false)
    }

    async fn flush(&self) -> Result<(), ContractError> {
        let mut state = self.state.lock().unwrap();
        Self::take_error(&mut state)?;
        state.flush_count += 1;
        Ok(())
    }

    async fn close(&self) -> Result<(), ContractError> {
        let mut state = self.state.lock().unwrap();
        state.close_count += 1;
        Self::take_error(&mut state)
    }
}
