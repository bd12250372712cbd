//! In-memory book of the external fungible asset.
//!
//! The token contract itself is outside this workspace; the ledger and the
//! guard only need balances and an atomic transfer, which is all this book
//! provides. `mint` exists for genesis funding and tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AssetError;
use crate::{Address, Amount};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenBook {
    balances: HashMap<Address, Amount>,
    total_supply: Amount,
}

impl TokenBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(Amount::ZERO)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Credit `amount` to `to` out of thin air.
    pub fn mint(&mut self, to: &Address, amount: Amount) -> Result<(), AssetError> {
        if to.is_zero() {
            return Err(AssetError::ZeroAddress);
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(AssetError::Overflow)?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(AssetError::Overflow)?;
        self.total_supply = supply;
        self.balances.insert(*to, balance);
        Ok(())
    }

    /// Move `amount` from `from` to `to`. Either both balances change or neither does.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError> {
        if to.is_zero() {
            return Err(AssetError::ZeroAddress);
        }
        let available = self.balance_of(from);
        let debited = available
            .checked_sub(amount)
            .ok_or(AssetError::InsufficientBalance {
                account: *from,
                needed: amount,
                available,
            })?;
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(AssetError::Overflow)?;
        self.balances.insert(*from, debited);
        self.balances.insert(*to, credited);
        tracing::trace!(%from, %to, %amount, "asset transfer");
        Ok(())
    }

    /// Pay several recipients out of one account as a single unit.
    ///
    /// Every leg is checked against a scratch copy of the touched balances
    /// first; the book is only written once all legs succeed.
    pub fn transfer_batch(
        &mut self,
        from: &Address,
        legs: &[(Address, Amount)],
    ) -> Result<(), AssetError> {
        let mut scratch: HashMap<Address, Amount> = HashMap::new();
        scratch.insert(*from, self.balance_of(from));
        for (to, amount) in legs {
            if to.is_zero() {
                return Err(AssetError::ZeroAddress);
            }
            let available = scratch[from];
            let debited = available
                .checked_sub(*amount)
                .ok_or(AssetError::InsufficientBalance {
                    account: *from,
                    needed: *amount,
                    available,
                })?;
            scratch.insert(*from, debited);
            let current = scratch
                .get(to)
                .copied()
                .unwrap_or_else(|| self.balance_of(to));
            let credited = current.checked_add(*amount).ok_or(AssetError::Overflow)?;
            scratch.insert(*to, credited);
        }
        self.balances.extend(scratch);
        Ok(())
    }
}
