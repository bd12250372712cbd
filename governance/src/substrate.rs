//! In-process execution substrate.
//!
//! Owns the asset book, the staking ledger, the treasury guard and the
//! registry, and routes executed operations to the subsystem they name.

use keel_stake::StakeLedger;
use keel_treasury::TreasuryGuard;
use keel_types::{Address, ErrorKind, OperationId, Timestamp, TokenBook};

use crate::error::{CallError, RegistryError};
use crate::operation::{CallOutput, OperationKind, OperationType, StakeDeposit, StakeWithdraw};
use crate::registry::{OperationRegistry, OperationTarget, RegistryEvent};

/// Mesh and reward game logic living outside this workspace.
///
/// Receives `MESH_*` and `REWARD_*` operations; returns raw call output.
pub trait ExternalCollaborator: Send {
    fn call(
        &mut self,
        caller: &Address,
        target: &Address,
        kind: &OperationKind,
        now: Timestamp,
    ) -> Result<Vec<u8>, CallError>;
}

pub struct Substrate {
    tokens: TokenBook,
    ledger: StakeLedger,
    /// Reached only through direct safe/owner/spender calls via
    /// [`Substrate::treasury_and_tokens`]; no operation kind targets it.
    treasury: TreasuryGuard,
    registry: OperationRegistry,
    collaborator: Box<dyn ExternalCollaborator>,
}

/// Borrowed view handed to the registry for one execution.
struct Targets<'a> {
    tokens: &'a mut TokenBook,
    ledger: &'a mut StakeLedger,
    collaborator: &'a mut Box<dyn ExternalCollaborator>,
}

fn require_ledger(ledger: &StakeLedger, target: &Address) -> Result<(), CallError> {
    if *target != ledger.address() {
        return Err(CallError::new(
            ErrorKind::Validation,
            format!("target {target} is not the staking ledger"),
        ));
    }
    Ok(())
}

impl OperationTarget for Targets<'_> {
    fn dispatch(
        &mut self,
        caller: &Address,
        target: &Address,
        kind: &OperationKind,
        now: Timestamp,
    ) -> Result<CallOutput, CallError> {
        match kind {
            OperationKind::Stake(StakeDeposit { amount, term_days }) => {
                require_ledger(self.ledger, target)?;
                let position = self
                    .ledger
                    .stake(self.tokens, caller, *amount, *term_days, now)?;
                Ok(CallOutput::Staked {
                    maturity: position.maturity,
                })
            }
            OperationKind::StakeWithdraw(StakeWithdraw { early }) => {
                require_ledger(self.ledger, target)?;
                let settlement = if *early {
                    self.ledger.early_withdraw(self.tokens, caller, now)?
                } else {
                    self.ledger.withdraw(self.tokens, caller, now)?
                };
                Ok(CallOutput::Settled {
                    paid: settlement.paid,
                    interest: settlement.interest,
                    penalty: settlement.penalty,
                })
            }
            OperationKind::MeshClaim(_)
            | OperationKind::MeshWithdraw(_)
            | OperationKind::RewardSet(_)
            | OperationKind::RewardWithdraw(_) => self
                .collaborator
                .call(caller, target, kind, now)
                .map(CallOutput::External),
            // The registry handles these itself.
            OperationKind::EmergencyPause | OperationKind::EmergencyResume => Ok(CallOutput::Unit),
        }
    }
}

impl Substrate {
    pub fn new(
        tokens: TokenBook,
        ledger: StakeLedger,
        treasury: TreasuryGuard,
        registry: OperationRegistry,
        collaborator: Box<dyn ExternalCollaborator>,
    ) -> Self {
        Self {
            tokens,
            ledger,
            treasury,
            registry,
            collaborator,
        }
    }

    pub fn tokens(&self) -> &TokenBook {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenBook {
        &mut self.tokens
    }

    pub fn ledger(&self) -> &StakeLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut StakeLedger {
        &mut self.ledger
    }

    /// The ledger together with the book it settles against, for direct user
    /// actions that bypass the registry.
    pub fn ledger_and_tokens(&mut self) -> (&mut StakeLedger, &mut TokenBook) {
        (&mut self.ledger, &mut self.tokens)
    }

    pub fn treasury(&self) -> &TreasuryGuard {
        &self.treasury
    }

    pub fn treasury_and_tokens(&mut self) -> (&mut TreasuryGuard, &mut TokenBook) {
        (&mut self.treasury, &mut self.tokens)
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut OperationRegistry {
        &mut self.registry
    }

    pub fn propose(
        &mut self,
        proposer: &Address,
        kind: OperationKind,
        target: Address,
        description: impl Into<String>,
        now: Timestamp,
    ) -> Result<OperationId, RegistryError> {
        self.registry.propose(proposer, kind, target, description, now)
    }

    pub fn propose_operation(
        &mut self,
        proposer: &Address,
        op_type: OperationType,
        target: Address,
        payload: &[u8],
        description: impl Into<String>,
        now: Timestamp,
    ) -> Result<OperationId, RegistryError> {
        self.registry
            .propose_operation(proposer, op_type, target, payload, description, now)
    }

    /// Execute `id` on behalf of `caller`, which must be the registry's safe.
    pub fn execute_operation(
        &mut self,
        caller: &Address,
        id: &OperationId,
        now: Timestamp,
    ) -> Result<CallOutput, RegistryError> {
        let Self {
            tokens,
            ledger,
            registry,
            collaborator,
            ..
        } = self;
        let mut targets = Targets {
            tokens,
            ledger,
            collaborator,
        };
        registry.execute_operation(caller, id, now, &mut targets)
    }

    pub fn batch_execute_operations(
        &mut self,
        caller: &Address,
        ids: &[OperationId],
        now: Timestamp,
    ) -> Vec<(OperationId, Result<CallOutput, RegistryError>)> {
        let Self {
            tokens,
            ledger,
            registry,
            collaborator,
            ..
        } = self;
        let mut targets = Targets {
            tokens,
            ledger,
            collaborator,
        };
        registry.batch_execute_operations(caller, ids, now, &mut targets)
    }

    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        self.registry.drain_events()
    }
}
