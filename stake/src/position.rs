//! Staking positions and their lifecycle.

use keel_types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};

pub const MIN_TERM_DAYS: u64 = 1;
pub const MAX_TERM_DAYS: u64 = 365;

/// Where a position is in its lifecycle.
///
/// `Active → Matured → Closed`; claiming interest does not change state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    /// Staked, principal locked, maturity not reached.
    Active,
    /// Maturity reached; withdrawable without penalty.
    Matured,
    /// Withdrawn (normally or early). Terminal.
    Closed,
}

/// A single owner's time-locked stake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    pub owner: Address,
    pub principal: Amount,
    pub term_days: u64,
    pub start: Timestamp,
    /// `start + term_days × 86400`.
    pub maturity: Timestamp,
    /// Interest accrues from here; moved forward on every claim.
    pub accrual_base: Timestamp,
    /// APY locked in when the position was opened.
    pub apy_bps: u32,
    pub closed_at: Option<Timestamp>,
}

impl StakePosition {
    pub fn open(owner: Address, principal: Amount, term_days: u64, apy_bps: u32, now: Timestamp) -> Self {
        Self {
            owner,
            principal,
            term_days,
            start: now,
            maturity: now.plus_days(term_days),
            accrual_base: now,
            apy_bps,
            closed_at: None,
        }
    }

    pub fn state(&self, now: Timestamp) -> PositionState {
        if self.closed_at.is_some() {
            PositionState::Closed
        } else if now >= self.maturity {
            PositionState::Matured
        } else {
            PositionState::Active
        }
    }

    pub fn is_matured(&self, now: Timestamp) -> bool {
        now >= self.maturity
    }

    /// Seconds of accrual since the last claim (or since staking).
    pub fn accrual_elapsed(&self, now: Timestamp) -> u64 {
        self.accrual_base.elapsed_since(now)
    }
}

/// Read-only view of a position, as returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeInfo {
    pub owner: Address,
    pub principal: Amount,
    pub term_days: u64,
    pub start: Timestamp,
    pub maturity: Timestamp,
    pub apy_bps: u32,
    pub current_interest: Amount,
    pub state: PositionState,
}

/// What a withdrawal paid out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    /// The position as it was when closed (`closed_at` set).
    pub position: StakePosition,
    /// Interest actually paid.
    pub interest: Amount,
    /// Accrued interest the reward pool could not cover, forfeited on close.
    pub unpaid_interest: Amount,
    /// Early-exit penalty sent to the foundation; zero at maturity.
    pub penalty: Amount,
    /// Net amount credited to the owner.
    pub paid: Amount,
}
