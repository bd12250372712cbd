//! The operation registry: proposals, single execution, emergency pause.

use std::collections::HashMap;

use keel_types::{Address, OperationId, Timestamp};

use crate::error::{CallError, RegistryError};
use crate::operation::{CallOutput, Operation, OperationKind, OperationType};

/// Where an executed operation's call lands.
///
/// The registry decides *whether* an operation may run; the target decides
/// what running it means. Control operations (pause/resume) are handled by
/// the registry and never reach a target.
pub trait OperationTarget {
    fn dispatch(
        &mut self,
        caller: &Address,
        target: &Address,
        kind: &OperationKind,
        now: Timestamp,
    ) -> Result<CallOutput, CallError>;
}

/// Audit events, drained by whoever mirrors them off-substrate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryEvent {
    OperationProposed {
        id: OperationId,
        op_type: OperationType,
        target: Address,
        proposer: Address,
    },
    OperationExecuted {
        id: OperationId,
        op_type: OperationType,
    },
    Paused {
        by: Address,
    },
    Resumed {
        by: Address,
    },
}

pub struct OperationRegistry {
    /// The registry's own account; the caller seen by dispatched calls.
    address: Address,
    safe: Address,
    operations: HashMap<OperationId, Operation>,
    /// Proposal order, for listing.
    order: Vec<OperationId>,
    paused: bool,
    events: Vec<RegistryEvent>,
}

impl OperationRegistry {
    pub fn new(address: Address, safe: Address) -> Self {
        Self {
            address,
            safe,
            operations: HashMap::new(),
            order: Vec::new(),
            paused: false,
            events: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn safe(&self) -> Address {
        self.safe
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn operation(&self, id: &OperationId) -> Option<&Operation> {
        self.operations.get(id)
    }

    pub fn operation_count(&self) -> usize {
        self.order.len()
    }

    /// Operations still awaiting execution, oldest first.
    pub fn pending_operations(&self) -> Vec<&Operation> {
        self.order
            .iter()
            .filter_map(|id| self.operations.get(id))
            .filter(|op| !op.executed)
            .collect()
    }

    /// Take all events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }

    /// Propose an operation from its type and opaque payload.
    ///
    /// Fails only when `payload` does not decode to a well-formed payload
    /// for `op_type`.
    pub fn propose_operation(
        &mut self,
        proposer: &Address,
        op_type: OperationType,
        target: Address,
        payload: &[u8],
        description: impl Into<String>,
        now: Timestamp,
    ) -> Result<OperationId, RegistryError> {
        let kind = OperationKind::decode(op_type, payload)?;
        Ok(self.insert(proposer, kind, target, description.into(), now))
    }

    /// Propose an already-typed operation.
    pub fn propose(
        &mut self,
        proposer: &Address,
        kind: OperationKind,
        target: Address,
        description: impl Into<String>,
        now: Timestamp,
    ) -> Result<OperationId, RegistryError> {
        kind.validate()?;
        Ok(self.insert(proposer, kind, target, description.into(), now))
    }

    fn insert(
        &mut self,
        proposer: &Address,
        kind: OperationKind,
        target: Address,
        description: String,
        now: Timestamp,
    ) -> OperationId {
        let op_type = kind.op_type();
        let nonce = self.order.len() as u64;
        let id = OperationId::derive(&[
            op_type.as_str().as_bytes(),
            target.as_bytes(),
            &kind.payload(),
            &now.as_secs().to_le_bytes(),
            &nonce.to_le_bytes(),
        ]);
        self.operations.insert(
            id,
            Operation {
                id,
                kind,
                target,
                description,
                proposer: *proposer,
                proposed_at: now,
                executed: false,
                executed_at: None,
            },
        );
        self.order.push(id);
        self.events.push(RegistryEvent::OperationProposed {
            id,
            op_type,
            target,
            proposer: *proposer,
        });
        tracing::info!(id = %id.short(), %op_type, %target, "operation proposed");
        id
    }

    /// Execute a proposed operation exactly once.
    ///
    /// Takes `&mut self`, so the executed check and the executed write form one
    /// step: of several callers racing on the same id, the first to get the
    /// registry executes and every later one observes `AlreadyExecuted`.
    ///
    /// Only the safe may execute. A revert from the target leaves the
    /// operation `Proposed`.
    pub fn execute_operation(
        &mut self,
        caller: &Address,
        id: &OperationId,
        now: Timestamp,
        target: &mut dyn OperationTarget,
    ) -> Result<CallOutput, RegistryError> {
        self.require_safe(caller)?;
        let op = self
            .operations
            .get(id)
            .ok_or(RegistryError::UnknownOperation(*id))?;
        if op.executed {
            return Err(RegistryError::AlreadyExecuted(*id));
        }
        let op_type = op.op_type();
        if self.paused && op_type != OperationType::EmergencyResume {
            return Err(RegistryError::Paused);
        }

        let output = match &op.kind {
            OperationKind::EmergencyPause => {
                self.paused = true;
                self.events.push(RegistryEvent::Paused { by: *caller });
                CallOutput::Unit
            }
            OperationKind::EmergencyResume => {
                self.paused = false;
                self.events.push(RegistryEvent::Resumed { by: *caller });
                CallOutput::Unit
            }
            kind => match target.dispatch(&self.address, &op.target, kind, now) {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(id = %id.short(), %op_type, reason = %e, "operation call reverted");
                    return Err(e.into());
                }
            },
        };

        if let Some(op) = self.operations.get_mut(id) {
            op.executed = true;
            op.executed_at = Some(now);
        }
        self.events.push(RegistryEvent::OperationExecuted { id: *id, op_type });
        tracing::info!(id = %id.short(), %op_type, "operation executed");
        Ok(output)
    }

    /// Execute each id in order, continuing past failures.
    ///
    /// One failing operation does not block unrelated ones; the result for
    /// every id is reported in input order.
    pub fn batch_execute_operations(
        &mut self,
        caller: &Address,
        ids: &[OperationId],
        now: Timestamp,
        target: &mut dyn OperationTarget,
    ) -> Vec<(OperationId, Result<CallOutput, RegistryError>)> {
        let results: Vec<_> = ids
            .iter()
            .map(|id| (*id, self.execute_operation(caller, id, now, target)))
            .collect();
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        tracing::info!(total = ids.len(), failed, "batch execution finished");
        results
    }

    fn require_safe(&self, caller: &Address) -> Result<(), RegistryError> {
        if *caller != self.safe {
            return Err(RegistryError::NotSafe);
        }
        Ok(())
    }

    pub fn emergency_pause(&mut self, caller: &Address) -> Result<(), RegistryError> {
        self.require_safe(caller)?;
        self.paused = true;
        self.events.push(RegistryEvent::Paused { by: *caller });
        tracing::warn!(by = %caller, "registry paused");
        Ok(())
    }

    pub fn emergency_resume(&mut self, caller: &Address) -> Result<(), RegistryError> {
        self.require_safe(caller)?;
        self.paused = false;
        self.events.push(RegistryEvent::Resumed { by: *caller });
        tracing::info!(by = %caller, "registry resumed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{MeshClaim, StakeWithdraw};
    use keel_types::ErrorKind;

    /// Records every dispatch; fails when `fail` is set.
    #[derive(Default)]
    struct RecordingTarget {
        calls: Vec<OperationType>,
        fail: bool,
    }

    impl OperationTarget for RecordingTarget {
        fn dispatch(
            &mut self,
            _caller: &Address,
            _target: &Address,
            kind: &OperationKind,
            _now: Timestamp,
        ) -> Result<CallOutput, CallError> {
            if self.fail {
                return Err(CallError::new(ErrorKind::TransientExecutionFailure, "boom"));
            }
            self.calls.push(kind.op_type());
            Ok(CallOutput::External(vec![1]))
        }
    }

    fn safe() -> Address {
        Address::repeat(0x5a)
    }

    fn registry() -> OperationRegistry {
        OperationRegistry::new(Address::repeat(0x6e), safe())
    }

    fn mesh_claim(id: &str) -> OperationKind {
        OperationKind::MeshClaim(MeshClaim {
            mesh_id: id.into(),
            auto_swap: 0,
        })
    }

    fn now() -> Timestamp {
        Timestamp::new(1_700_000_000)
    }

    #[test]
    fn propose_stores_unexecuted_record_and_emits_event() {
        let mut reg = registry();
        let id = reg
            .propose(&safe(), mesh_claim("E1N1"), Address::repeat(0x33), "Claim mesh: E1N1", now())
            .unwrap();
        let op = reg.operation(&id).unwrap();
        assert!(!op.executed);
        assert_eq!(op.description, "Claim mesh: E1N1");
        assert_eq!(reg.operation_count(), 1);
        assert!(matches!(
            reg.drain_events().as_slice(),
            [RegistryEvent::OperationProposed { op_type: OperationType::MeshClaim, .. }]
        ));
        assert!(reg.drain_events().is_empty());
    }

    #[test]
    fn identical_proposals_get_distinct_ids() {
        let mut reg = registry();
        let target = Address::repeat(0x33);
        let a = reg.propose(&safe(), mesh_claim("E1N1"), target, "a", now()).unwrap();
        let b = reg.propose(&safe(), mesh_claim("E1N1"), target, "a", now()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let mut reg = registry();
        let err = reg
            .propose_operation(&safe(), OperationType::MeshClaim, Address::repeat(0x33), &[1, 2, 3], "bad", now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(reg.operation_count(), 0);
    }

    #[test]
    fn second_execution_fails_with_already_executed() {
        let mut reg = registry();
        let mut target = RecordingTarget::default();
        let id = reg
            .propose(&safe(), mesh_claim("E1N1"), Address::repeat(0x33), "claim", now())
            .unwrap();

        reg.execute_operation(&safe(), &id, now(), &mut target).unwrap();
        let err = reg.execute_operation(&safe(), &id, now(), &mut target).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyExecuted(id));
        assert_eq!(err.kind(), ErrorKind::AlreadyExecuted);
        assert_eq!(target.calls.len(), 1);
        assert!(reg.operation(&id).unwrap().executed);
    }

    #[test]
    fn reverted_call_leaves_operation_proposed() {
        let mut reg = registry();
        let mut target = RecordingTarget {
            fail: true,
            ..Default::default()
        };
        let id = reg
            .propose(&safe(), mesh_claim("E1N1"), Address::repeat(0x33), "claim", now())
            .unwrap();
        let err = reg.execute_operation(&safe(), &id, now(), &mut target).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientExecutionFailure);
        assert!(!reg.operation(&id).unwrap().executed);

        target.fail = false;
        reg.execute_operation(&safe(), &id, now(), &mut target).unwrap();
        assert!(reg.operation(&id).unwrap().executed);
    }

    #[test]
    fn pause_blocks_everything_but_resume() {
        let mut reg = registry();
        let mut target = RecordingTarget::default();
        let claim = reg
            .propose(&safe(), mesh_claim("E1N1"), Address::repeat(0x33), "claim", now())
            .unwrap();
        let resume = reg
            .propose(&safe(), OperationKind::EmergencyResume, reg.address(), "resume", now())
            .unwrap();

        assert_eq!(reg.emergency_pause(&Address::repeat(1)), Err(RegistryError::NotSafe));
        reg.emergency_pause(&safe()).unwrap();

        let err = reg.execute_operation(&safe(), &claim, now(), &mut target).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Paused);

        reg.execute_operation(&safe(), &resume, now(), &mut target).unwrap();
        assert!(!reg.is_paused());
        reg.execute_operation(&safe(), &claim, now(), &mut target).unwrap();
        assert!(target.calls.iter().all(|t| !t.is_control()));
    }

    #[test]
    fn pause_operation_sets_flag() {
        let mut reg = registry();
        let mut target = RecordingTarget::default();
        let pause = reg
            .propose(&safe(), OperationKind::EmergencyPause, reg.address(), "pause", now())
            .unwrap();
        reg.execute_operation(&safe(), &pause, now(), &mut target).unwrap();
        assert!(reg.is_paused());
        assert!(target.calls.is_empty());
        reg.emergency_resume(&safe()).unwrap();
        assert!(!reg.is_paused());
    }

    #[test]
    fn batch_continues_past_failures() {
        let mut reg = registry();
        let mut target = RecordingTarget::default();
        let a = reg
            .propose(&safe(), mesh_claim("A"), Address::repeat(0x33), "a", now())
            .unwrap();
        let b = reg
            .propose(
                &safe(),
                OperationKind::StakeWithdraw(StakeWithdraw { early: false }),
                Address::repeat(0x34),
                "b",
                now(),
            )
            .unwrap();
        reg.execute_operation(&safe(), &a, now(), &mut target).unwrap();
        let unknown = OperationId::new([9; 32]);

        let results = reg.batch_execute_operations(&safe(), &[a, unknown, b], now(), &mut target);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].1, Err(RegistryError::AlreadyExecuted(a)));
        assert_eq!(results[1].1, Err(RegistryError::UnknownOperation(unknown)));
        assert!(results[2].1.is_ok());
        assert!(reg.pending_operations().is_empty());
    }

    #[test]
    fn only_the_safe_executes() {
        let mut reg = registry();
        let mut target = RecordingTarget::default();
        let stranger = Address::repeat(0x99);
        reg.emergency_pause(&safe()).unwrap();

        // Anyone may propose, but a stranger's resume must not lift the pause.
        let resume = reg
            .propose(&stranger, OperationKind::EmergencyResume, reg.address(), "resume", now())
            .unwrap();
        let err = reg
            .execute_operation(&stranger, &resume, now(), &mut target)
            .unwrap_err();
        assert_eq!(err, RegistryError::NotSafe);
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert!(reg.is_paused());
        assert!(!reg.operation(&resume).unwrap().executed);

        let results = reg.batch_execute_operations(&stranger, &[resume], now(), &mut target);
        assert_eq!(results[0].1, Err(RegistryError::NotSafe));
        assert!(reg.is_paused());

        reg.execute_operation(&safe(), &resume, now(), &mut target).unwrap();
        assert!(!reg.is_paused());
        assert!(target.calls.is_empty());
    }
}
