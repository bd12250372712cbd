//! Treasury guard errors.

use keel_types::{Address, Amount, AssetError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreasuryError {
    #[error("Only owner can call this function")]
    NotOwner,

    #[error("Only Safe can call this function")]
    NotSafe,

    #[error("recipient {0} not approved")]
    RecipientNotApproved(Address),

    #[error("auto limit not enabled for {0}")]
    AutoLimitDisabled(Address),

    #[error("amount must be greater than 0")]
    ZeroAmount,

    #[error("address cannot be zero")]
    ZeroAddress,

    #[error("per-tx limit exceeded: {amount} > {limit}")]
    PerTxLimitExceeded { amount: Amount, limit: Amount },

    #[error("daily limit exceeded: {spent} spent + {amount} > {limit}")]
    DailyLimitExceeded {
        spent: Amount,
        amount: Amount,
        limit: Amount,
    },

    #[error("per-tx limit {per_tx} exceeds daily limit {daily}")]
    InvalidLimits { per_tx: Amount, daily: Amount },

    #[error("insufficient treasury balance: need {needed}, have {available}")]
    Insufficient { needed: Amount, available: Amount },

    #[error("asset transfer failed: {0}")]
    Asset(AssetError),
}

impl TreasuryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotOwner
            | Self::NotSafe
            | Self::RecipientNotApproved(_)
            | Self::AutoLimitDisabled(_) => ErrorKind::Permission,
            Self::PerTxLimitExceeded { .. } | Self::DailyLimitExceeded { .. } => {
                ErrorKind::LimitExceeded
            }
            Self::Insufficient { .. } => ErrorKind::InsufficientBalance,
            Self::Asset(e) => e.kind(),
            Self::ZeroAmount | Self::ZeroAddress | Self::InvalidLimits { .. } => {
                ErrorKind::Validation
            }
        }
    }
}

impl From<AssetError> for TreasuryError {
    fn from(e: AssetError) -> Self {
        match e {
            AssetError::InsufficientBalance {
                needed, available, ..
            } => Self::Insufficient { needed, available },
            other => Self::Asset(other),
        }
    }
}
