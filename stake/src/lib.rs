//! Interest-accrual staking ledger.
//!
//! Each owner holds at most one time-locked position. Interest is simple,
//! accrues lazily from the position's accrual base, and is computed on read:
//! `interest = principal × apy_bps / 10000 × elapsed / seconds_per_year`.
//!
//! This crate handles:
//! - Opening positions with a 1–365 day term
//! - Claiming interest without unlocking principal
//! - Withdrawal at maturity and penalised early withdrawal
//! - Safe-gated parameter updates (APY, foundation, penalty)

pub mod error;
pub mod interest;
pub mod ledger;
pub mod position;

pub use error::StakeError;
pub use ledger::{StakeLedger, StakeStats, DEFAULT_EARLY_PENALTY_BPS, MAX_APY_BPS};
pub use position::{PositionState, Settlement, StakeInfo, StakePosition, MAX_TERM_DAYS, MIN_TERM_DAYS};
