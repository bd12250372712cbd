//! The path from a queued item to the registry.

use std::sync::Arc;

use async_trait::async_trait;
use keel_governance::{CallOutput, RegistryError, Substrate};
use keel_types::{Address, Clock, OperationId};
use tokio::sync::Mutex;

use crate::error::DispatchError;
use crate::queue::QueuedOperation;

/// A finished execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    pub gas_used: u64,
    pub output: Option<CallOutput>,
}

/// Proposes and executes operations on behalf of the safe.
///
/// Both calls resolve only once the substrate has reached a final status.
#[async_trait]
pub trait OperationDispatcher: Send + Sync {
    async fn propose(&self, op: &QueuedOperation) -> Result<OperationId, DispatchError>;

    async fn execute(&self, registry_id: &OperationId) -> Result<Execution, DispatchError>;
}

/// Dispatches into an in-process [`Substrate`].
pub struct RegistryDispatcher {
    substrate: Arc<Mutex<Substrate>>,
    /// Identity proposals are made under.
    proposer: Address,
    clock: Arc<dyn Clock>,
}

impl RegistryDispatcher {
    pub fn new(substrate: Arc<Mutex<Substrate>>, proposer: Address, clock: Arc<dyn Clock>) -> Self {
        Self {
            substrate,
            proposer,
            clock,
        }
    }
}

#[async_trait]
impl OperationDispatcher for RegistryDispatcher {
    async fn propose(&self, op: &QueuedOperation) -> Result<OperationId, DispatchError> {
        let now = self.clock.now();
        let mut substrate = self.substrate.lock().await;
        let id = substrate.propose(
            &self.proposer,
            op.kind.clone(),
            op.target,
            op.description.clone(),
            now,
        )?;
        Ok(id)
    }

    async fn execute(&self, registry_id: &OperationId) -> Result<Execution, DispatchError> {
        let now = self.clock.now();
        let mut substrate = self.substrate.lock().await;
        let op_type = substrate
            .registry()
            .operation(registry_id)
            .map(|op| op.op_type())
            .ok_or(RegistryError::UnknownOperation(*registry_id))?;
        let output = substrate.execute_operation(&self.proposer, registry_id, now)?;
        Ok(Execution {
            gas_used: op_type.gas_estimate(),
            output: Some(output),
        })
    }
}
