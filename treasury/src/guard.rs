//! The treasury guard.

use std::collections::{HashMap, HashSet};

use keel_types::{Address, Amount, Timestamp, TokenBook};

use crate::error::TreasuryError;
use crate::limits::{AutoLimit, DailySpend};

/// Treasury account plus the rules deciding who may move its funds.
///
/// The balance itself lives at `address` in the [`TokenBook`]; the guard
/// keeps only the authorization state around it.
pub struct TreasuryGuard {
    address: Address,
    owner: Address,
    safe: Address,
    approved_spenders: HashSet<Address>,
    auto_limits: HashMap<Address, AutoLimit>,
    daily_spent: HashMap<Address, DailySpend>,
}

impl TreasuryGuard {
    pub fn new(address: Address, owner: Address, safe: Address) -> Self {
        Self {
            address,
            owner,
            safe,
            approved_spenders: HashSet::new(),
            auto_limits: HashMap::new(),
            daily_spent: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn safe(&self) -> Address {
        self.safe
    }

    pub fn balance(&self, tokens: &TokenBook) -> Amount {
        tokens.balance_of(&self.address)
    }

    pub fn is_spender(&self, account: &Address) -> bool {
        self.approved_spenders.contains(account)
    }

    pub fn auto_limit(&self, spender: &Address) -> Option<AutoLimit> {
        self.auto_limits.get(spender).copied()
    }

    /// Spend recorded for `spender` as seen at `now` (rolled if the day changed).
    pub fn daily_spent(&self, spender: &Address, now: Timestamp) -> DailySpend {
        self.daily_spent
            .get(spender)
            .copied()
            .unwrap_or_default()
            .rolled(now)
    }

    /// How much `spender` can still auto-draw in the current day-bucket.
    pub fn remaining_allowance(&self, spender: &Address, now: Timestamp) -> Amount {
        match self.auto_limits.get(spender) {
            Some(limit) if limit.enabled => self.daily_spent(spender, now).remaining(limit.daily, now),
            _ => Amount::ZERO,
        }
    }

    fn require_owner(&self, caller: &Address) -> Result<(), TreasuryError> {
        if *caller != self.owner {
            return Err(TreasuryError::NotOwner);
        }
        Ok(())
    }

    fn require_safe(&self, caller: &Address) -> Result<(), TreasuryError> {
        if *caller != self.safe {
            return Err(TreasuryError::NotSafe);
        }
        Ok(())
    }

    fn ensure_balance(&self, tokens: &TokenBook, amount: Amount) -> Result<(), TreasuryError> {
        let available = self.balance(tokens);
        if amount > available {
            return Err(TreasuryError::Insufficient {
                needed: amount,
                available,
            });
        }
        Ok(())
    }

    pub fn set_safe(&mut self, caller: &Address, safe: Address) -> Result<(), TreasuryError> {
        self.require_owner(caller)?;
        if safe.is_zero() {
            return Err(TreasuryError::ZeroAddress);
        }
        tracing::info!(old = %self.safe, new = %safe, "treasury safe updated");
        self.safe = safe;
        Ok(())
    }

    pub fn set_spender(
        &mut self,
        caller: &Address,
        spender: Address,
        approved: bool,
    ) -> Result<(), TreasuryError> {
        self.require_owner(caller)?;
        if approved {
            self.approved_spenders.insert(spender);
        } else {
            self.approved_spenders.remove(&spender);
        }
        tracing::info!(%spender, approved, "spender approval changed");
        Ok(())
    }

    /// Configure the self-service channel for `spender`.
    pub fn set_auto_limit(
        &mut self,
        caller: &Address,
        spender: Address,
        per_tx: Amount,
        daily: Amount,
        enabled: bool,
    ) -> Result<(), TreasuryError> {
        self.require_owner(caller)?;
        if per_tx > daily {
            return Err(TreasuryError::InvalidLimits { per_tx, daily });
        }
        self.auto_limits.insert(
            spender,
            AutoLimit {
                per_tx,
                daily,
                enabled,
            },
        );
        tracing::info!(%spender, %per_tx, %daily, enabled, "auto limit configured");
        Ok(())
    }

    /// Safe-initiated transfer to an approved spender. No amount limit applies.
    pub fn transfer_to(
        &mut self,
        tokens: &mut TokenBook,
        caller: &Address,
        recipient: &Address,
        amount: Amount,
    ) -> Result<(), TreasuryError> {
        self.require_safe(caller)?;
        if !self.is_spender(recipient) {
            return Err(TreasuryError::RecipientNotApproved(*recipient));
        }
        if amount.is_zero() {
            return Err(TreasuryError::ZeroAmount);
        }
        self.ensure_balance(tokens, amount)?;
        tokens.transfer(&self.address, recipient, amount)?;
        tracing::info!(%recipient, %amount, "safe transfer");
        Ok(())
    }

    /// Safe-initiated one-off transfer on behalf of `spender`.
    ///
    /// Governance override: bypasses the spender's auto-limits and does not
    /// count against its day-bucket. The recipient need not be approved.
    pub fn transfer_for(
        &mut self,
        tokens: &mut TokenBook,
        caller: &Address,
        spender: &Address,
        recipient: &Address,
        amount: Amount,
    ) -> Result<(), TreasuryError> {
        self.require_safe(caller)?;
        if amount.is_zero() {
            return Err(TreasuryError::ZeroAmount);
        }
        if recipient.is_zero() {
            return Err(TreasuryError::ZeroAddress);
        }
        self.ensure_balance(tokens, amount)?;
        tokens.transfer(&self.address, recipient, amount)?;
        tracing::info!(%spender, %recipient, %amount, "safe transfer on behalf of spender");
        Ok(())
    }

    /// Spender-initiated transfer within its per-tx and daily limits.
    ///
    /// `caller` is the spender. The day-bucket rolls over lazily here: a
    /// stale bucket is treated as empty before the daily check.
    pub fn auto_transfer_to(
        &mut self,
        tokens: &mut TokenBook,
        caller: &Address,
        recipient: &Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), TreasuryError> {
        let limit = match self.auto_limits.get(caller) {
            Some(limit) if limit.enabled => *limit,
            _ => return Err(TreasuryError::AutoLimitDisabled(*caller)),
        };
        if amount.is_zero() {
            return Err(TreasuryError::ZeroAmount);
        }
        if amount > limit.per_tx {
            return Err(TreasuryError::PerTxLimitExceeded {
                amount,
                limit: limit.per_tx,
            });
        }
        if !self.is_spender(recipient) {
            return Err(TreasuryError::RecipientNotApproved(*recipient));
        }

        let spend = self.daily_spent(caller, now);
        let spent = spend.spent_in_bucket;
        let after = match spent.checked_add(amount) {
            Some(after) if after <= limit.daily => after,
            _ => {
                return Err(TreasuryError::DailyLimitExceeded {
                    spent,
                    amount,
                    limit: limit.daily,
                })
            }
        };
        self.ensure_balance(tokens, amount)?;
        tokens.transfer(&self.address, recipient, amount)?;

        self.daily_spent.insert(
            *caller,
            DailySpend {
                last_bucket: spend.last_bucket,
                spent_in_bucket: after,
            },
        );
        tracing::info!(
            spender = %caller,
            %recipient,
            %amount,
            spent_today = %after,
            daily_limit = %limit.daily,
            "auto transfer"
        );
        Ok(())
    }
}
