//! Nullable dispatcher: records calls and fails on script.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use keel_governance::OperationType;
use keel_scheduler::{DispatchError, Execution, OperationDispatcher, QueuedOperation};
use keel_types::{ErrorKind, OperationId};

#[derive(Default)]
struct Inner {
    proposals: Vec<(OperationId, OperationType)>,
    executions: Vec<OperationId>,
    /// Consumed front-first by `execute`.
    execute_failures: VecDeque<DispatchError>,
    propose_failures: VecDeque<DispatchError>,
    executed: Vec<OperationId>,
}

/// Stand-in for the registry path.
///
/// Proposals get sequential ids. Executions succeed unless a scripted
/// failure is pending; executing an id twice reports `AlreadyExecuted`.
#[derive(Default)]
pub struct NullDispatcher {
    inner: Mutex<Inner>,
    /// Simulated time to finality for each execute call.
    latency: Option<Duration>,
}

impl NullDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// The next `count` executions fail with a transient error.
    pub fn fail_next_executions(&self, count: usize, reason: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            for _ in 0..count {
                inner
                    .execute_failures
                    .push_back(DispatchError::transient(reason));
            }
        }
    }

    /// Script the next execution to fail with an arbitrary error.
    pub fn fail_next_execution_with(&self, error: DispatchError) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.execute_failures.push_back(error);
        }
    }

    pub fn fail_next_proposal(&self, reason: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .propose_failures
                .push_back(DispatchError::transient(reason));
        }
    }

    pub fn proposals(&self) -> Vec<(OperationId, OperationType)> {
        self.inner.lock().map(|i| i.proposals.clone()).unwrap_or_default()
    }

    /// Every execute call, successful or not.
    pub fn executions(&self) -> Vec<OperationId> {
        self.inner.lock().map(|i| i.executions.clone()).unwrap_or_default()
    }

    fn poisoned(e: impl std::fmt::Display) -> DispatchError {
        DispatchError::new(ErrorKind::PermanentFailure, e.to_string())
    }
}

#[async_trait]
impl OperationDispatcher for NullDispatcher {
    async fn propose(&self, op: &QueuedOperation) -> Result<OperationId, DispatchError> {
        let mut inner = self.inner.lock().map_err(Self::poisoned)?;
        if let Some(error) = inner.propose_failures.pop_front() {
            return Err(error);
        }
        let n = inner.proposals.len() as u64;
        let id = OperationId::derive(&[b"null-proposal", &n.to_le_bytes()]);
        inner.proposals.push((id, op.op_type()));
        Ok(id)
    }

    async fn execute(&self, registry_id: &OperationId) -> Result<Execution, DispatchError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut inner = self.inner.lock().map_err(Self::poisoned)?;
        inner.executions.push(*registry_id);
        let op_type = inner
            .proposals
            .iter()
            .find(|(id, _)| id == registry_id)
            .map(|(_, t)| *t)
            .ok_or_else(|| DispatchError::new(ErrorKind::Validation, "unknown operation"))?;
        if inner.executed.contains(registry_id) {
            return Err(DispatchError::new(
                ErrorKind::AlreadyExecuted,
                format!("operation {registry_id} already executed"),
            ));
        }
        if let Some(error) = inner.execute_failures.pop_front() {
            return Err(error);
        }
        inner.executed.push(*registry_id);
        Ok(Execution {
            gas_used: op_type.gas_estimate(),
            output: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_governance::{OperationKind, StakeWithdraw};
    use keel_scheduler::RetryState;
    use keel_types::{Address, Timestamp};

    fn queued() -> QueuedOperation {
        QueuedOperation {
            id: OperationId::new([1; 32]),
            kind: OperationKind::StakeWithdraw(StakeWithdraw { early: false }),
            target: Address::repeat(0x5e),
            description: "withdraw".into(),
            enqueued_at: Timestamp::new(0),
            retry: RetryState::fresh(7, Timestamp::new(0)),
            registry_id: None,
        }
    }

    #[tokio::test]
    async fn scripted_failures_then_success_then_already_executed() {
        let dispatcher = NullDispatcher::new();
        let id = dispatcher.propose(&queued()).await.unwrap();
        dispatcher.fail_next_executions(1, "reverted");

        assert_eq!(dispatcher.execute(&id).await.unwrap_err().reason, "reverted");
        let execution = dispatcher.execute(&id).await.unwrap();
        assert_eq!(execution.gas_used, OperationType::StakeWithdraw.gas_estimate());
        assert_eq!(
            dispatcher.execute(&id).await.unwrap_err().kind,
            ErrorKind::AlreadyExecuted
        );
        assert_eq!(dispatcher.executions().len(), 3);
        assert_eq!(dispatcher.proposals().len(), 1);
    }
}
