//! The staking ledger: positions, interest payouts, governance mutators.

use std::collections::HashMap;

use keel_types::{Address, Amount, Timestamp, TokenBook};
use serde::{Deserialize, Serialize};

use crate::error::StakeError;
use crate::interest::simple_interest;
use crate::position::{Settlement, StakeInfo, StakePosition, MAX_TERM_DAYS, MIN_TERM_DAYS};

/// Early-exit penalty applied to principal unless governance changes it: 10%.
pub const DEFAULT_EARLY_PENALTY_BPS: u32 = 1_000;

/// Upper bound accepted by `update_apy`: 100% APY.
pub const MAX_APY_BPS: u32 = 10_000;

/// Aggregate view of the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeStats {
    pub total_locked: Amount,
    pub open_positions: usize,
    pub current_apy_bps: u32,
    pub early_penalty_bps: u32,
    pub total_interest_paid: Amount,
    pub total_penalties: Amount,
    /// Ledger balance not backing principal, available for interest.
    pub reward_pool: Amount,
    pub foundation: Address,
}

/// Time-locked staking ledger with lazily accrued simple interest.
///
/// The ledger holds principal and the reward pool at its own `address` in
/// the [`TokenBook`]. Interest is only ever paid out of the reward pool
/// (balance above `total_locked`), never out of other owners' principal.
///
/// Every mutating call computes its full effect before touching state, so a
/// failing call leaves the ledger and the book unchanged.
pub struct StakeLedger {
    address: Address,
    safe: Address,
    foundation: Address,
    apy_bps: u32,
    early_penalty_bps: u32,
    positions: HashMap<Address, StakePosition>,
    total_locked: Amount,
    total_interest_paid: Amount,
    total_penalties: Amount,
}

impl StakeLedger {
    pub fn new(address: Address, foundation: Address, safe: Address, apy_bps: u32) -> Self {
        Self {
            address,
            safe,
            foundation,
            apy_bps,
            early_penalty_bps: DEFAULT_EARLY_PENALTY_BPS,
            positions: HashMap::new(),
            total_locked: Amount::ZERO,
            total_interest_paid: Amount::ZERO,
            total_penalties: Amount::ZERO,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn safe(&self) -> Address {
        self.safe
    }

    pub fn foundation(&self) -> Address {
        self.foundation
    }

    pub fn apy_bps(&self) -> u32 {
        self.apy_bps
    }

    pub fn early_penalty_bps(&self) -> u32 {
        self.early_penalty_bps
    }

    pub fn position(&self, owner: &Address) -> Option<&StakePosition> {
        self.positions.get(owner)
    }

    /// Open a position for `caller`, locking `amount` until `now + term_days`.
    ///
    /// Re-staking while a position is open is rejected rather than topped up.
    pub fn stake(
        &mut self,
        tokens: &mut TokenBook,
        caller: &Address,
        amount: Amount,
        term_days: u64,
        now: Timestamp,
    ) -> Result<StakePosition, StakeError> {
        if amount.is_zero() {
            return Err(StakeError::ZeroAmount);
        }
        if term_days < MIN_TERM_DAYS {
            return Err(StakeError::TermTooShort);
        }
        if term_days > MAX_TERM_DAYS {
            return Err(StakeError::TermTooLong);
        }
        if self.positions.contains_key(caller) {
            return Err(StakeError::ActiveStakeExists);
        }
        let total_locked = self
            .total_locked
            .checked_add(amount)
            .ok_or(StakeError::Overflow)?;

        tokens.transfer(caller, &self.address, amount)?;

        let position = StakePosition::open(*caller, amount, term_days, self.apy_bps, now);
        self.total_locked = total_locked;
        self.positions.insert(*caller, position.clone());
        tracing::info!(
            owner = %caller,
            %amount,
            term_days,
            maturity = %position.maturity,
            apy_bps = position.apy_bps,
            "stake opened"
        );
        Ok(position)
    }

    /// Interest accrued on `owner`'s position since its accrual base.
    pub fn accrued_interest(&self, owner: &Address, now: Timestamp) -> Result<Amount, StakeError> {
        let position = self.positions.get(owner).ok_or(StakeError::NoActiveStake)?;
        Self::interest_for(position, now)
    }

    fn interest_for(position: &StakePosition, now: Timestamp) -> Result<Amount, StakeError> {
        simple_interest(position.principal, position.apy_bps, position.accrual_elapsed(now))
            .ok_or(StakeError::Overflow)
    }

    /// Balance held above locked principal.
    pub fn reward_pool(&self, tokens: &TokenBook) -> Amount {
        tokens.balance_of(&self.address).saturating_sub(self.total_locked)
    }

    fn ensure_pool_covers(&self, tokens: &TokenBook, interest: Amount) -> Result<(), StakeError> {
        let available = self.reward_pool(tokens);
        if interest > available {
            return Err(StakeError::InsufficientRewardPool {
                needed: interest,
                available,
            });
        }
        Ok(())
    }

    /// Split accrued interest into what the reward pool can pay now and the
    /// shortfall it cannot.
    fn payable_interest(&self, tokens: &TokenBook, accrued: Amount) -> (Amount, Amount) {
        let paid = accrued.min(self.reward_pool(tokens));
        (paid, accrued.saturating_sub(paid))
    }

    /// Close a matured position, paying principal plus accrued interest.
    ///
    /// Principal is always released. Interest the reward pool cannot cover
    /// is forfeited and reported as `unpaid_interest`.
    pub fn withdraw(
        &mut self,
        tokens: &mut TokenBook,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Settlement, StakeError> {
        let position = self.positions.get(caller).cloned().ok_or(StakeError::NoActiveStake)?;
        if !position.is_matured(now) {
            return Err(StakeError::NotMatured {
                maturity: position.maturity,
            });
        }
        let accrued = Self::interest_for(&position, now)?;
        let (interest, unpaid) = self.payable_interest(tokens, accrued);
        let paid = position
            .principal
            .checked_add(interest)
            .ok_or(StakeError::Overflow)?;
        let total_interest_paid = self
            .total_interest_paid
            .checked_add(interest)
            .ok_or(StakeError::Overflow)?;

        tokens.transfer(&self.address, caller, paid)?;

        let settlement = self.close(position, interest, unpaid, Amount::ZERO, paid, now);
        self.total_interest_paid = total_interest_paid;
        tracing::info!(owner = %caller, %paid, %interest, "stake withdrawn at maturity");
        Ok(settlement)
    }

    /// Pay out accrued interest and move the accrual base to `now`.
    ///
    /// Principal stays locked; the position keeps its maturity.
    pub fn claim_interest(
        &mut self,
        tokens: &mut TokenBook,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Amount, StakeError> {
        let position = self.positions.get(caller).ok_or(StakeError::NoActiveStake)?;
        let interest = Self::interest_for(position, now)?;
        self.ensure_pool_covers(tokens, interest)?;
        let total_interest_paid = self
            .total_interest_paid
            .checked_add(interest)
            .ok_or(StakeError::Overflow)?;

        if !interest.is_zero() {
            tokens.transfer(&self.address, caller, interest)?;
        }

        self.total_interest_paid = total_interest_paid;
        if let Some(position) = self.positions.get_mut(caller) {
            position.accrual_base = now;
        }
        tracing::info!(owner = %caller, %interest, "interest claimed");
        Ok(interest)
    }

    /// Close a position before maturity.
    ///
    /// The owner receives `principal − penalty + accrued interest`, where
    /// `penalty = principal × early_penalty_bps / 10000` goes to the foundation.
    /// As with [`StakeLedger::withdraw`], interest is capped at the reward pool.
    pub fn early_withdraw(
        &mut self,
        tokens: &mut TokenBook,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Settlement, StakeError> {
        let position = self.positions.get(caller).cloned().ok_or(StakeError::NoActiveStake)?;
        if position.is_matured(now) {
            return Err(StakeError::AlreadyMatured);
        }
        let accrued = Self::interest_for(&position, now)?;
        let (interest, unpaid) = self.payable_interest(tokens, accrued);
        let penalty = position
            .principal
            .checked_bps(self.early_penalty_bps)
            .ok_or(StakeError::Overflow)?;
        let paid = position
            .principal
            .checked_sub(penalty)
            .and_then(|net| net.checked_add(interest))
            .ok_or(StakeError::Overflow)?;
        let total_interest_paid = self
            .total_interest_paid
            .checked_add(interest)
            .ok_or(StakeError::Overflow)?;
        let total_penalties = self
            .total_penalties
            .checked_add(penalty)
            .ok_or(StakeError::Overflow)?;

        let mut legs = vec![(*caller, paid)];
        if !penalty.is_zero() {
            legs.push((self.foundation, penalty));
        }
        tokens.transfer_batch(&self.address, &legs)?;

        let settlement = self.close(position, interest, unpaid, penalty, paid, now);
        self.total_interest_paid = total_interest_paid;
        self.total_penalties = total_penalties;
        tracing::info!(
            owner = %caller,
            %paid,
            %interest,
            %penalty,
            foundation = %self.foundation,
            "stake withdrawn early"
        );
        Ok(settlement)
    }

    fn close(
        &mut self,
        mut position: StakePosition,
        interest: Amount,
        unpaid_interest: Amount,
        penalty: Amount,
        paid: Amount,
        now: Timestamp,
    ) -> Settlement {
        if !unpaid_interest.is_zero() {
            tracing::warn!(
                owner = %position.owner,
                %unpaid_interest,
                "reward pool short, interest forfeited on exit"
            );
        }
        self.positions.remove(&position.owner);
        self.total_locked = self.total_locked.saturating_sub(position.principal);
        position.closed_at = Some(now);
        Settlement {
            position,
            interest,
            unpaid_interest,
            penalty,
            paid,
        }
    }

    fn require_safe(&self, caller: &Address) -> Result<(), StakeError> {
        if *caller != self.safe {
            tracing::warn!(%caller, "rejected governance call from non-safe caller");
            return Err(StakeError::NotSafe);
        }
        Ok(())
    }

    /// Set the APY applied to positions opened from now on.
    ///
    /// Open positions keep the APY they were opened with.
    pub fn update_apy(&mut self, caller: &Address, apy_bps: u32) -> Result<(), StakeError> {
        self.require_safe(caller)?;
        if apy_bps > MAX_APY_BPS {
            return Err(StakeError::ApyTooHigh(apy_bps));
        }
        tracing::info!(old = self.apy_bps, new = apy_bps, "apy updated");
        self.apy_bps = apy_bps;
        Ok(())
    }

    pub fn update_foundation(&mut self, caller: &Address, foundation: Address) -> Result<(), StakeError> {
        self.require_safe(caller)?;
        if foundation.is_zero() {
            return Err(StakeError::ZeroFoundation);
        }
        tracing::info!(old = %self.foundation, new = %foundation, "foundation updated");
        self.foundation = foundation;
        Ok(())
    }

    pub fn update_penalty(&mut self, caller: &Address, penalty_bps: u32) -> Result<(), StakeError> {
        self.require_safe(caller)?;
        if penalty_bps >= 10_000 {
            return Err(StakeError::PenaltyTooHigh(penalty_bps));
        }
        tracing::info!(old = self.early_penalty_bps, new = penalty_bps, "early-withdraw penalty updated");
        self.early_penalty_bps = penalty_bps;
        Ok(())
    }

    pub fn stake_info(&self, owner: &Address, now: Timestamp) -> Option<StakeInfo> {
        let position = self.positions.get(owner)?;
        let current_interest = Self::interest_for(position, now).unwrap_or(Amount::ZERO);
        Some(StakeInfo {
            owner: position.owner,
            principal: position.principal,
            term_days: position.term_days,
            start: position.start,
            maturity: position.maturity,
            apy_bps: position.apy_bps,
            current_interest,
            state: position.state(now),
        })
    }

    pub fn stats(&self, tokens: &TokenBook) -> StakeStats {
        StakeStats {
            total_locked: self.total_locked,
            open_positions: self.positions.len(),
            current_apy_bps: self.apy_bps,
            early_penalty_bps: self.early_penalty_bps,
            total_interest_paid: self.total_interest_paid,
            total_penalties: self.total_penalties,
            reward_pool: self.reward_pool(tokens),
            foundation: self.foundation,
        }
    }
}
