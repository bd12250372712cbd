//! Safe-governed operation registry.
//!
//! Privileged cross-contract actions are proposed as typed [`Operation`]s and
//! executed at most once. Execution is the only governance entry point into
//! the staking ledger and external collaborators; direct user actions bypass
//! the registry entirely.
//!
//! Lifecycle: `Proposed → Executed` (terminal). Records are never deleted.
//! A global pause flag, toggled by the safe, blocks every operation except
//! `EMERGENCY_RESUME`.

pub mod error;
pub mod operation;
pub mod registry;
pub mod substrate;

pub use error::{CallError, RegistryError};
pub use operation::{
    CallOutput, MeshClaim, MeshWithdraw, Operation, OperationKind, OperationStatus, OperationType,
    RewardSet, RewardWithdraw, StakeDeposit, StakeWithdraw,
};
pub use registry::{OperationRegistry, OperationTarget, RegistryEvent};
pub use substrate::{ExternalCollaborator, Substrate};
