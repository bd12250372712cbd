//! Treasury guard.
//!
//! Holds the foundation's balance of the treasury asset and authorizes spends
//! through two channels:
//! - **Safe channel**: the multisig safe moves funds to approved spenders
//!   (`transfer_to`) or on behalf of any spender (`transfer_for`) without limits.
//! - **Auto channel**: a spender draws for itself (`auto_transfer_to`) within a
//!   per-transaction limit and a rolling day-bucket limit.

pub mod error;
pub mod guard;
pub mod limits;

pub use error::TreasuryError;
pub use guard::TreasuryGuard;
pub use limits::{AutoLimit, DailySpend};
