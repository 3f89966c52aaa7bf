// src/ledger.rs

//! Fungible-token ledger seam.
//!
//! The exchange never owns token balances itself; it talks to two ledgers
//! (USDT in, pUSD out) through [`TokenLedger`]. [`MemoryLedger`] is a plain
//! ERC-20 style ledger used for local runs and tests.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::{Address, Amount};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("transfer amount exceeds balance: have {have}, need {need}")]
    InsufficientBalance { have: Amount, need: Amount },
    #[error("insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance { have: Amount, need: Amount },
    #[error("transfer to the zero address")]
    ZeroAddress,
    #[error("balance overflow")]
    Overflow,
    #[error("ledger failure: {0}")]
    Other(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Minimal capability set the exchange needs from a token.
///
/// `sender` / `spender` stand in for the calling account; a ledger must
/// apply a transfer completely or return an error without side effects.
pub trait TokenLedger {
    fn balance_of(&self, account: &Address) -> Amount;

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;

    /// Push `amount` from `sender` to `to`.
    fn transfer(&mut self, sender: &Address, to: &Address, amount: Amount) -> LedgerResult<()>;

    /// Pull `amount` from `from` to `to`, spending `spender`'s allowance.
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> LedgerResult<()>;
}

/// In-memory ERC-20 ledger. An allowance of `Amount::MAX` is treated as
/// unlimited and never decremented.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    symbol: String,
    address: Address,
    total_supply: Amount,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
}

impl MemoryLedger {
    pub fn new(symbol: impl Into<String>, address: Address) -> Self {
        Self {
            symbol: symbol.into(),
            address,
            ..Self::default()
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Token contract address.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn mint(&mut self, to: &Address, amount: Amount) -> LedgerResult<()> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let bal = self.balance_of(to);
        self.balances.insert(*to, bal + amount);
        self.total_supply = supply;
        Ok(())
    }

    pub fn burn(&mut self, from: &Address, amount: Amount) -> LedgerResult<()> {
        let bal = self.balance_of(from);
        if bal < amount {
            return Err(LedgerError::InsufficientBalance { have: bal, need: amount });
        }
        self.balances.insert(*from, bal - amount);
        self.total_supply -= amount;
        Ok(())
    }

    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) {
        self.allowances.insert((*owner, *spender), amount);
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: Amount) -> LedgerResult<()> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let from_bal = self.balance_of(from);
        if from_bal < amount {
            return Err(LedgerError::InsufficientBalance { have: from_bal, need: amount });
        }
        if from == to {
            return Ok(());
        }
        let to_bal = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.balances.insert(*from, from_bal - amount);
        self.balances.insert(*to, to_bal);
        Ok(())
    }
}

impl TokenLedger for MemoryLedger {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn transfer(&mut self, sender: &Address, to: &Address, amount: Amount) -> LedgerResult<()> {
        self.move_balance(sender, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance { have: allowance, need: amount });
        }
        self.move_balance(from, to, amount)?;
        if allowance != Amount::MAX {
            self.allowances.insert((*from, *spender), allowance - amount);
        }
        Ok(())
    }
}
