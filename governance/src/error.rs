use keel_stake::StakeError;
use keel_types::{ErrorKind, OperationId};
use thiserror::Error;

use crate::operation::OperationType;

/// A revert from the call an operation dispatched to.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct CallError {
    pub kind: ErrorKind,
    pub reason: String,
}

impl CallError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<StakeError> for CallError {
    fn from(e: StakeError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("operation {0} not found")]
    UnknownOperation(OperationId),

    #[error("malformed payload for {op_type}: {reason}")]
    MalformedPayload {
        op_type: OperationType,
        reason: String,
    },

    #[error("operation {0} already executed")]
    AlreadyExecuted(OperationId),

    #[error("registry is paused")]
    Paused,

    #[error("Only Safe can call this function")]
    NotSafe,

    #[error("call reverted: {0}")]
    Call(#[from] CallError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownOperation(_) | Self::MalformedPayload { .. } => ErrorKind::Validation,
            Self::AlreadyExecuted(_) => ErrorKind::AlreadyExecuted,
            Self::Paused => ErrorKind::Paused,
            Self::NotSafe => ErrorKind::Permission,
            Self::Call(e) => e.kind,
        }
    }
}
