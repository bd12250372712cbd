//! Execution history: one record per finished queue item.

use std::collections::HashMap;

use keel_governance::OperationType;
use keel_types::{OperationId, Timestamp};
use serde::Serialize;

/// Outcome of a queue item that left the queue for good.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    /// Queue id.
    pub id: OperationId,
    pub op_type: OperationType,
    pub success: bool,
    pub timestamp: Timestamp,
    pub gas_used: u64,
    pub attempts: u32,
    pub error: Option<String>,
    pub registry_id: Option<OperationId>,
}

/// In-memory only; lost on restart.
#[derive(Default)]
pub struct ExecutionHistory {
    records: HashMap<OperationId, ExecutionRecord>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ExecutionRecord) {
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: &OperationId) -> Option<&ExecutionRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.values().filter(|r| !r.success)
    }
}
