//! Nullable operation source: hands out scripted batches.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use keel_scheduler::{Candidate, OperationSource, SchedulerError};

/// Each poll returns the next scripted batch; empty once the script runs out.
#[derive(Default)]
pub struct NullSource {
    batches: Mutex<VecDeque<Vec<Candidate>>>,
}

impl NullSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch for a future poll.
    pub fn push_batch(&self, batch: Vec<Candidate>) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push_back(batch);
        }
    }

    pub fn remaining(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[async_trait]
impl OperationSource for NullSource {
    async fn poll(&self) -> Result<Vec<Candidate>, SchedulerError> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|e| SchedulerError::Source(e.to_string()))?;
        Ok(batches.pop_front().unwrap_or_default())
    }
}
