//! Error taxonomy shared across crates.

use thiserror::Error;

use crate::{Address, Amount};

/// Classification every crate-level error maps onto.
///
/// Callers that only need to know *what kind* of failure happened (the
/// scheduler deciding whether to retry, tests asserting a revert class)
/// match on this rather than on each crate's concrete error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad amount, term, address shape or payload.
    Validation,
    /// Caller lacks the required role (owner, safe, approved spender).
    Permission,
    /// Per-transaction or daily limit exceeded.
    LimitExceeded,
    InsufficientBalance,
    AlreadyExecuted,
    Paused,
    /// Network or gas related, safe to retry.
    TransientExecutionFailure,
    /// Retry budget exhausted.
    PermanentFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::LimitExceeded => "limit_exceeded",
            Self::InsufficientBalance => "insufficient_balance",
            Self::AlreadyExecuted => "already_executed",
            Self::Paused => "paused",
            Self::TransientExecutionFailure => "transient",
            Self::PermanentFailure => "permanent",
        }
    }

    /// Whether the same call can succeed later without being changed.
    ///
    /// Balances get funded, limits roll over and pauses lift; a bad payload
    /// or a missing role does not fix itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LimitExceeded
            | Self::InsufficientBalance
            | Self::Paused
            | Self::TransientExecutionFailure => true,
            Self::Validation | Self::Permission | Self::AlreadyExecuted | Self::PermanentFailure => {
                false
            }
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address: {0} is missing the 0x prefix")]
    MissingPrefix(String),

    #[error("invalid address: expected 40 hex digits, got {0}")]
    BadLength(usize),

    #[error("invalid address: {0}")]
    BadHex(String),
}

/// Failures of the asset book itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("insufficient balance: {account} needs {needed}, has {available}")]
    InsufficientBalance {
        account: Address,
        needed: Amount,
        available: Amount,
    },

    #[error("transfer to the zero address")]
    ZeroAddress,

    #[error("arithmetic overflow in asset balance")]
    Overflow,
}

impl AssetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::ZeroAddress | Self::Overflow => ErrorKind::Validation,
        }
    }
}
