// src/shared.rs

//! Thread-safe handle over one [`Exchange`].
//!
//! Reads (`get_rate`, quotes, accessors) share a read lock and see a
//! committed state. `buy`, `withdraw_usdt` and `transfer_ownership` hold the
//! write lock for their whole run, so two mutations never interleave.
//! Nothing is locked between a quote and a later purchase: a quote is advisory.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::curve::Purchase;
use crate::events::ExchangeEvent;
use crate::exchange::{Exchange, ExchangeError};
use crate::ledger::TokenLedger;
use crate::types::{Address, Amount};

pub struct SharedExchange<U: TokenLedger, P: TokenLedger> {
    inner: Arc<RwLock<Exchange<U, P>>>,
}

impl<U: TokenLedger, P: TokenLedger> Clone for SharedExchange<U, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U: TokenLedger, P: TokenLedger> SharedExchange<U, P> {
    pub fn new(exchange: Exchange<U, P>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(exchange)),
        }
    }

    pub fn get_rate(&self) -> u128 {
        self.inner.read().get_rate()
    }

    pub fn released(&self) -> Amount {
        self.inner.read().released()
    }

    pub fn owner(&self) -> Address {
        self.inner.read().owner()
    }

    pub fn calculate_purchase_amount(&self, usdt_amount: Amount) -> Result<Amount, ExchangeError> {
        self.inner.read().calculate_purchase_amount(usdt_amount)
    }

    pub fn quote(&self, usdt_amount: Amount) -> Result<Purchase, ExchangeError> {
        self.inner.read().quote(usdt_amount)
    }

    pub fn buy(&self, buyer: Address, usdt_amount: Amount) -> Result<Amount, ExchangeError> {
        self.inner.write().buy(buyer, usdt_amount)
    }

    pub fn withdraw_usdt(&self, caller: Address, to: Address) -> Result<Amount, ExchangeError> {
        self.inner.write().withdraw_usdt(caller, to)
    }

    pub fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<(), ExchangeError> {
        self.inner.write().transfer_ownership(caller, new_owner)
    }

    pub fn drain_events(&self) -> Vec<ExchangeEvent> {
        self.inner.write().drain_events()
    }

    /// Run `f` against a consistent snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&Exchange<U, P>) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` with exclusive access, e.g. to fund or approve on a ledger.
    pub fn write<R>(&self, f: impl FnOnce(&mut Exchange<U, P>) -> R) -> R {
        f(&mut self.inner.write())
    }
}
