//! Staking ledger errors.

use keel_types::{Amount, AssetError, ErrorKind, Timestamp};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StakeError {
    #[error("amount must be greater than 0")]
    ZeroAmount,

    #[error("term must be at least 1 day")]
    TermTooShort,

    #[error("term cannot exceed 1 year")]
    TermTooLong,

    #[error("active stake exists for this account")]
    ActiveStakeExists,

    #[error("no active stake")]
    NoActiveStake,

    #[error("stake not matured: unlocks at {maturity}")]
    NotMatured { maturity: Timestamp },

    #[error("stake already matured, use withdraw")]
    AlreadyMatured,

    #[error("Only Safe can call this function")]
    NotSafe,

    #[error("apy of {0} bps exceeds the maximum")]
    ApyTooHigh(u32),

    #[error("penalty of {0} bps must be below 10000")]
    PenaltyTooHigh(u32),

    #[error("foundation cannot be the zero address")]
    ZeroFoundation,

    #[error("insufficient reward pool: need {needed}, available {available}")]
    InsufficientRewardPool { needed: Amount, available: Amount },

    #[error("asset transfer failed: {0}")]
    Asset(#[from] AssetError),

    #[error("arithmetic overflow in interest computation")]
    Overflow,
}

impl StakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSafe => ErrorKind::Permission,
            Self::InsufficientRewardPool { .. } => ErrorKind::InsufficientBalance,
            Self::Asset(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }
}
