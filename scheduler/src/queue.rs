//! Priority queue of pending operations.
//!
//! Ordered by priority (higher first); equal priorities pop in insertion
//! order. Ids are unique within the queue.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashSet};

use keel_governance::{OperationKind, OperationType};
use keel_types::{Address, OperationId, Timestamp};
use serde::Serialize;

use crate::retry::RetryState;

/// An operation waiting for the execution loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub target: Address,
    pub description: String,
    pub enqueued_at: Timestamp,
    pub retry: RetryState,
    /// Set once the registry has accepted the proposal; retries then only
    /// re-execute.
    pub registry_id: Option<OperationId>,
}

impl QueuedOperation {
    pub fn op_type(&self) -> OperationType {
        self.kind.op_type()
    }

    pub fn priority(&self) -> u8 {
        self.retry.priority
    }
}

struct Entry {
    op: QueuedOperation,
    sequence: u64,
}

impl Eq for Entry {}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.op.priority() == other.op.priority() && self.sequence == other.sequence
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; on tie, earlier sequence first.
        self.op
            .priority()
            .cmp(&other.op.priority())
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub total: usize,
    pub by_type: BTreeMap<OperationType, usize>,
    pub by_priority: BTreeMap<u8, usize>,
}

#[derive(Default)]
pub struct OperationQueue {
    heap: BinaryHeap<Entry>,
    ids: HashSet<OperationId>,
    sequence: u64,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `op`. Returns `false` (and drops it) if its id is already queued.
    pub fn push(&mut self, op: QueuedOperation) -> bool {
        if !self.ids.insert(op.id) {
            return false;
        }
        self.sequence += 1;
        self.heap.push(Entry {
            op,
            sequence: self.sequence,
        });
        true
    }

    pub fn pop(&mut self) -> Option<QueuedOperation> {
        let entry = self.heap.pop()?;
        self.ids.remove(&entry.op.id);
        Some(entry.op)
    }

    /// Up to `max` highest-priority items, best first.
    pub fn pop_batch(&mut self, max: usize) -> Vec<QueuedOperation> {
        std::iter::from_fn(|| self.pop()).take(max).collect()
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn status(&self) -> QueueStatus {
        let mut status = QueueStatus {
            total: self.heap.len(),
            ..Default::default()
        };
        for entry in self.heap.iter() {
            *status.by_type.entry(entry.op.op_type()).or_default() += 1;
            *status.by_priority.entry(entry.op.priority()).or_default() += 1;
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_governance::{MeshClaim, StakeWithdraw};

    fn op(n: u8, priority: u8, kind: OperationKind) -> QueuedOperation {
        QueuedOperation {
            id: OperationId::new([n; 32]),
            kind,
            target: Address::repeat(0x33),
            description: format!("op {n}"),
            enqueued_at: Timestamp::new(0),
            retry: RetryState::fresh(priority, Timestamp::new(0)),
            registry_id: None,
        }
    }

    fn claim() -> OperationKind {
        OperationKind::MeshClaim(MeshClaim {
            mesh_id: "E1N1".into(),
            auto_swap: 0,
        })
    }

    fn withdraw() -> OperationKind {
        OperationKind::StakeWithdraw(StakeWithdraw { early: false })
    }

    #[test]
    fn higher_priority_pops_first() {
        let mut queue = OperationQueue::new();
        queue.push(op(1, 3, claim()));
        queue.push(op(2, 9, claim()));
        queue.push(op(3, 5, claim()));
        let order: Vec<u8> = queue.pop_batch(10).iter().map(|o| o.priority()).collect();
        assert_eq!(order, vec![9, 5, 3]);
    }

    #[test]
    fn equal_priorities_are_fifo() {
        let mut queue = OperationQueue::new();
        for n in 1..=4 {
            queue.push(op(n, 7, claim()));
        }
        let ids: Vec<u8> = queue
            .pop_batch(4)
            .iter()
            .map(|o| o.id.as_bytes()[0])
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn duplicate_ids_are_dropped() {
        let mut queue = OperationQueue::new();
        assert!(queue.push(op(1, 3, claim())));
        assert!(!queue.push(op(1, 9, claim())));
        assert_eq!(queue.len(), 1);
        queue.pop();
        assert!(!queue.contains(&OperationId::new([1; 32])));
        assert!(queue.push(op(1, 9, claim())));
    }

    #[test]
    fn batch_is_capped() {
        let mut queue = OperationQueue::new();
        for n in 0..10 {
            queue.push(op(n, 5, claim()));
        }
        assert_eq!(queue.pop_batch(4).len(), 4);
        assert_eq!(queue.len(), 6);
    }

    #[test]
    fn status_breaks_down_by_type_and_priority() {
        let mut queue = OperationQueue::new();
        queue.push(op(1, 8, claim()));
        queue.push(op(2, 8, claim()));
        queue.push(op(3, 7, withdraw()));
        let status = queue.status();
        assert_eq!(status.total, 3);
        assert_eq!(status.by_type[&OperationType::MeshClaim], 2);
        assert_eq!(status.by_type[&OperationType::StakeWithdraw], 1);
        assert_eq!(status.by_priority[&8], 2);
        assert_eq!(status.by_priority[&7], 1);
    }
}
