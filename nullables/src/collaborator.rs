//! Nullable external collaborator: records mesh/reward calls.

use std::sync::{Arc, Mutex};

use keel_governance::{CallError, ExternalCollaborator, OperationKind};
use keel_types::{Address, ErrorKind, Timestamp};

/// A recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollaboratorCall {
    pub caller: Address,
    pub target: Address,
    pub kind: OperationKind,
    pub at: Timestamp,
}

/// Accepts every call with empty output unless told to revert.
///
/// Clones share their record, so a test can keep one handle while the
/// substrate owns another.
#[derive(Clone, Default)]
pub struct NullCollaborator {
    calls: Arc<Mutex<Vec<CollaboratorCall>>>,
    revert_with: Arc<Mutex<Option<String>>>,
}

impl NullCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revert every call with `reason` until cleared with `None`.
    pub fn set_revert(&self, reason: Option<&str>) {
        if let Ok(mut revert) = self.revert_with.lock() {
            *revert = reason.map(str::to_string);
        }
    }

    pub fn calls(&self) -> Vec<CollaboratorCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ExternalCollaborator for NullCollaborator {
    fn call(
        &mut self,
        caller: &Address,
        target: &Address,
        kind: &OperationKind,
        now: Timestamp,
    ) -> Result<Vec<u8>, CallError> {
        let revert = self
            .revert_with
            .lock()
            .map_err(|e| CallError::new(ErrorKind::PermanentFailure, e.to_string()))?
            .clone();
        if let Some(reason) = revert {
            return Err(CallError::new(ErrorKind::TransientExecutionFailure, reason));
        }
        let mut calls = self
            .calls
            .lock()
            .map_err(|e| CallError::new(ErrorKind::PermanentFailure, e.to_string()))?;
        calls.push(CollaboratorCall {
            caller: *caller,
            target: *target,
            kind: kind.clone(),
            at: now,
        });
        Ok(Vec::new())
    }
}
