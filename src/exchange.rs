// src/exchange.rs

//! The pUSD/USDT bonding curve exchange.
//!
//! One [`Exchange`] is one deployment: it holds the released-pUSD counter,
//! prices purchases with [`Curve`], and settles them against two external
//! ledgers. Every mutating call checks all of its preconditions before the
//! first ledger write, so a rejected call leaves no trace.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::curve::{Curve, CurveConfig, CurveError, Purchase, Stage};
use crate::events::ExchangeEvent;
use crate::ledger::{LedgerError, TokenLedger};
use crate::types::{Address, Amount};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("Amount must be greater than 0")]
    InvalidAmount,

    #[error("Insufficient USDT allowance: have {have}, need {need}")]
    InsufficientAllowance { have: Amount, need: Amount },

    #[error("Insufficient pUSD balance: have {have}, need {need}")]
    InsufficientPusdBalance { have: Amount, need: Amount },

    #[error("Bonding curve sold out: {unspent} USDT would go unspent")]
    CurveExhausted { unspent: Amount },

    #[error("Insufficient USDT balance: have {have}, need {need}")]
    InsufficientUsdtBalance { have: Amount, need: Amount },

    #[error("Ownable: caller is not the owner")]
    NotOwner,

    #[error("Invalid address")]
    InvalidAddress,

    #[error("No USDT to withdraw")]
    NothingToWithdraw,

    #[error("curve: {0}")]
    Curve(#[from] CurveError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

/// Construction-time settings of one exchange instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// The exchange's own account on both ledgers.
    pub address: Address,
    pub owner: Address,
    /// USDT token contract.
    pub usdt_token: Address,
    /// pUSD token contract.
    pub pusd_token: Address,
    #[serde(default)]
    pub curve: CurveConfig,
}

/// Most events kept before the oldest are dropped. Consumers are expected to
/// call [`Exchange::drain_events`] regularly.
pub const EVENT_LOG_CAPACITY: usize = 1024;

pub struct Exchange<U: TokenLedger, P: TokenLedger> {
    address: Address,
    owner: Address,
    usdt_token: Address,
    pusd_token: Address,
    usdt: U,
    pusd: P,
    curve: Curve,
    released: Amount,
    /// Bounded by [`EVENT_LOG_CAPACITY`]; callers own draining it.
    events: Vec<ExchangeEvent>,
}

impl<U: TokenLedger, P: TokenLedger> core::fmt::Debug for Exchange<U, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Exchange")
            .field("address", &self.address)
            .field("owner", &self.owner)
            .field("released", &self.released)
            .finish()
    }
}

impl<U: TokenLedger, P: TokenLedger> Exchange<U, P> {
    pub fn new(config: ExchangeConfig, usdt: U, pusd: P) -> Result<Self, ExchangeError> {
        if config.address.is_zero()
            || config.owner.is_zero()
            || config.usdt_token.is_zero()
            || config.pusd_token.is_zero()
        {
            return Err(ExchangeError::InvalidAddress);
        }
        let curve = Curve::new(config.curve)?;

        info!(
            address = %config.address,
            owner = %config.owner,
            usdt = %config.usdt_token,
            pusd = %config.pusd_token,
            "exchange deployed"
        );

        Ok(Self {
            address: config.address,
            owner: config.owner,
            usdt_token: config.usdt_token,
            pusd_token: config.pusd_token,
            usdt,
            pusd,
            curve,
            released: 0,
            events: Vec::new(),
        })
    }

    // ---------- read accessors ----------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn usdt(&self) -> Address {
        self.usdt_token
    }

    pub fn pusd(&self) -> Address {
        self.pusd_token
    }

    /// pUSD sold so far.
    pub fn released(&self) -> Amount {
        self.released
    }

    pub fn total_supply(&self) -> Amount {
        self.curve.total_supply
    }

    /// pUSD still sellable along the curve.
    pub fn remaining_supply(&self) -> Amount {
        self.curve.total_supply - self.released
    }

    pub fn curve(&self) -> &Curve {
        &self.curve
    }

    pub fn stage(&self) -> Stage {
        self.curve.stage_at(self.released)
    }

    pub fn usdt_ledger(&self) -> &U {
        &self.usdt
    }

    pub fn usdt_ledger_mut(&mut self) -> &mut U {
        &mut self.usdt
    }

    pub fn pusd_ledger(&self) -> &P {
        &self.pusd
    }

    pub fn pusd_ledger_mut(&mut self) -> &mut P {
        &mut self.pusd
    }

    /// Events since the last drain, oldest first.
    pub fn events(&self) -> &[ExchangeEvent] {
        &self.events
    }

    /// Hand the pending events to the caller and clear the log.
    pub fn drain_events(&mut self) -> Vec<ExchangeEvent> {
        std::mem::take(&mut self.events)
    }

    fn record(&mut self, event: ExchangeEvent) {
        if self.events.len() >= EVENT_LOG_CAPACITY {
            let dropped = self.events.len() + 1 - EVENT_LOG_CAPACITY;
            warn!(dropped, "event log full, dropping oldest undrained events");
            self.events.drain(..dropped);
        }
        self.events.push(event);
    }

    // ---------- pricing ----------

    /// Current marginal rate, pUSD per USDT.
    pub fn get_rate(&self) -> u128 {
        self.curve.rate_at(self.released)
    }

    /// pUSD a purchase of `usdt_amount` would yield right now.
    pub fn calculate_purchase_amount(&self, usdt_amount: Amount) -> Result<Amount, ExchangeError> {
        Ok(self.quote(usdt_amount)?.asset_out)
    }

    /// Full pricing of `usdt_amount` against the current released total.
    pub fn quote(&self, usdt_amount: Amount) -> Result<Purchase, ExchangeError> {
        let purchase = self.curve.quote(self.released, usdt_amount)?;
        debug!(
            released = self.released,
            usdt_in = usdt_amount,
            pusd_out = purchase.asset_out,
            unspent = purchase.unspent(),
            "quote"
        );
        Ok(purchase)
    }

    /// USDT needed to buy everything that is left.
    pub fn quote_to_exhaust(&self) -> Result<Amount, ExchangeError> {
        Ok(self.curve.quote_to_exhaust(self.released)?)
    }

    // ---------- mutations ----------

    /// Sell pUSD to `buyer` for `usdt_amount` USDT pulled via allowance.
    ///
    /// Rejections, first failure wins: zero amount, zero buyer, allowance,
    /// the exchange's pUSD balance, curve sold out, buyer's USDT balance.
    /// While supply remains, any positive input releases at least one unit.
    pub fn buy(&mut self, buyer: Address, usdt_amount: Amount) -> Result<Amount, ExchangeError> {
        if usdt_amount == 0 {
            warn!(%buyer, "buy rejected: zero amount");
            return Err(ExchangeError::InvalidAmount);
        }
        if buyer.is_zero() {
            return Err(ExchangeError::InvalidAddress);
        }

        let allowance = self.usdt.allowance(&buyer, &self.address);
        if allowance < usdt_amount {
            warn!(%buyer, allowance, usdt_amount, "buy rejected: allowance");
            return Err(ExchangeError::InsufficientAllowance {
                have: allowance,
                need: usdt_amount,
            });
        }

        let purchase = self.curve.quote(self.released, usdt_amount)?;
        let pusd_amount = purchase.asset_out;

        let pusd_held = self.pusd.balance_of(&self.address);
        if pusd_held < pusd_amount {
            warn!(%buyer, pusd_held, pusd_amount, "buy rejected: pUSD balance");
            return Err(ExchangeError::InsufficientPusdBalance {
                have: pusd_held,
                need: pusd_amount,
            });
        }
        if purchase.unspent() > 0 {
            warn!(%buyer, unspent = purchase.unspent(), "buy rejected: curve sold out");
            return Err(ExchangeError::CurveExhausted {
                unspent: purchase.unspent(),
            });
        }

        let usdt_held = self.usdt.balance_of(&buyer);
        if usdt_held < usdt_amount {
            warn!(%buyer, usdt_held, usdt_amount, "buy rejected: USDT balance");
            return Err(ExchangeError::InsufficientUsdtBalance {
                have: usdt_held,
                need: usdt_amount,
            });
        }

        // Payout first; a failed pull is undone by returning the payout.
        self.pusd.transfer(&self.address, &buyer, pusd_amount)?;
        if let Err(e) = self
            .usdt
            .transfer_from(&self.address, &buyer, &self.address, usdt_amount)
        {
            warn!(%buyer, error = %e, "USDT pull failed after payout, reversing");
            if let Err(undo) = self.pusd.transfer(&buyer, &self.address, pusd_amount) {
                error!(%buyer, pusd_amount, error = %undo, "pUSD payout reversal failed");
            }
            return Err(e.into());
        }

        self.released = purchase.end_step;
        debug_assert_eq!(self.released, purchase.start_step + pusd_amount);

        info!(
            %buyer,
            usdt_amount,
            pusd_amount,
            released = self.released,
            rate = self.get_rate(),
            "tokens purchased"
        );
        self.record(ExchangeEvent::TokensPurchased {
            buyer,
            usdt_amount,
            pusd_amount,
        });

        Ok(pusd_amount)
    }

    /// Owner-only: move the whole USDT balance to `to`.
    pub fn withdraw_usdt(&mut self, caller: Address, to: Address) -> Result<Amount, ExchangeError> {
        self.only_owner(caller)?;
        if to.is_zero() {
            return Err(ExchangeError::InvalidAddress);
        }

        let amount = self.usdt.balance_of(&self.address);
        if amount == 0 {
            warn!(%caller, "withdraw rejected: nothing to withdraw");
            return Err(ExchangeError::NothingToWithdraw);
        }

        self.usdt.transfer(&self.address, &to, amount)?;

        info!(%to, amount, "usdt withdrawn");
        self.record(ExchangeEvent::UsdtWithdrawn { to, amount });
        Ok(amount)
    }

    /// Owner-only: hand the owner role to `new_owner`.
    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<(), ExchangeError> {
        self.only_owner(caller)?;
        if new_owner.is_zero() {
            return Err(ExchangeError::InvalidAddress);
        }

        let previous_owner = self.owner;
        self.owner = new_owner;

        info!(%previous_owner, %new_owner, "ownership transferred");
        self.record(ExchangeEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
        });
        Ok(())
    }

    fn only_owner(&self, caller: Address) -> Result<(), ExchangeError> {
        if caller != self.owner {
            warn!(%caller, "rejected: caller is not the owner");
            return Err(ExchangeError::NotOwner);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{PUSD_TOTAL_SUPPLY, STAGE1_MAX, STAGE1_RATE, STAGE2_MAX, STAGE3_RATE};
    use crate::ledger::MemoryLedger;
    use crate::units::ONE_TOKEN;

    fn addr(x: u8) -> Address {
        let mut a = [0u8; 20];
        a[0] = x;
        Address(a)
    }

    const EXCHANGE: u8 = 0xE0;
    const OWNER: u8 = 0x01;
    const BUYER: u8 = 0x10;

    type TestExchange = Exchange<MemoryLedger, MemoryLedger>;

    fn setup() -> TestExchange {
        let config = ExchangeConfig {
            address: addr(EXCHANGE),
            owner: addr(OWNER),
            usdt_token: addr(0xA1),
            pusd_token: addr(0xA2),
            curve: CurveConfig::default(),
        };
        let mut usdt = MemoryLedger::new("USDT", config.usdt_token);
        let mut pusd = MemoryLedger::new("pUSD", config.pusd_token);

        usdt.mint(&addr(BUYER), 1_000_000 * ONE_TOKEN).unwrap();
        usdt.approve(&addr(BUYER), &addr(EXCHANGE), Amount::MAX);
        pusd.mint(&addr(EXCHANGE), PUSD_TOTAL_SUPPLY).unwrap();

        Exchange::new(config, usdt, pusd).unwrap()
    }

    #[test]
    fn deployment_state() {
        let ex = setup();
        assert_eq!(ex.owner(), addr(OWNER));
        assert_eq!(ex.usdt(), addr(0xA1));
        assert_eq!(ex.pusd(), addr(0xA2));
        assert_eq!(ex.released(), 0);
        assert_eq!(ex.total_supply(), PUSD_TOTAL_SUPPLY);
        assert_eq!(ex.remaining_supply(), PUSD_TOTAL_SUPPLY);
        assert_eq!(ex.stage(), Stage::High);
        assert_eq!(ex.get_rate(), STAGE1_RATE);
    }

    #[test]
    fn rejects_zero_addresses_at_construction() {
        let config = ExchangeConfig {
            address: addr(EXCHANGE),
            owner: Address::ZERO,
            usdt_token: addr(0xA1),
            pusd_token: addr(0xA2),
            curve: CurveConfig::default(),
        };
        let err = Exchange::new(config, MemoryLedger::default(), MemoryLedger::default()).unwrap_err();
        assert_eq!(err, ExchangeError::InvalidAddress);
    }

    #[test]
    fn buy_moves_both_tokens_and_released() {
        let mut ex = setup();
        let usdt_in = 100 * ONE_TOKEN;
        let expected = usdt_in * STAGE1_RATE;
        assert_eq!(ex.calculate_purchase_amount(usdt_in).unwrap(), expected);

        let out = ex.buy(addr(BUYER), usdt_in).unwrap();
        assert_eq!(out, expected);
        assert_eq!(ex.pusd_ledger().balance_of(&addr(BUYER)), expected);
        assert_eq!(ex.usdt_ledger().balance_of(&addr(EXCHANGE)), usdt_in);
        assert_eq!(ex.released(), expected);
        assert_eq!(
            ex.events(),
            &[ExchangeEvent::TokensPurchased {
                buyer: addr(BUYER),
                usdt_amount: usdt_in,
                pusd_amount: expected,
            }]
        );
    }

    #[test]
    fn zero_amount_is_invalid() {
        let mut ex = setup();
        assert_eq!(ex.buy(addr(BUYER), 0), Err(ExchangeError::InvalidAmount));
        assert!(ex.events().is_empty());
    }

    #[test]
    fn allowance_checked_before_balance() {
        let mut ex = setup();
        ex.usdt_ledger_mut().approve(&addr(BUYER), &addr(EXCHANGE), 0);
        // Drain pUSD too; allowance must still be the reported failure.
        ex.pusd_ledger_mut().burn(&addr(EXCHANGE), PUSD_TOTAL_SUPPLY).unwrap();

        let err = ex.buy(addr(BUYER), ONE_TOKEN).unwrap_err();
        assert_eq!(err, ExchangeError::InsufficientAllowance { have: 0, need: ONE_TOKEN });
        assert_eq!(ex.released(), 0);
        assert_eq!(ex.usdt_ledger().balance_of(&addr(BUYER)), 1_000_000 * ONE_TOKEN);
    }

    #[test]
    fn drained_pusd_rejects_without_effects() {
        let mut ex = setup();
        ex.pusd_ledger_mut().burn(&addr(EXCHANGE), PUSD_TOTAL_SUPPLY).unwrap();

        let err = ex.buy(addr(BUYER), ONE_TOKEN).unwrap_err();
        assert_eq!(
            err,
            ExchangeError::InsufficientPusdBalance { have: 0, need: ONE_TOKEN * STAGE1_RATE }
        );
        assert_eq!(err.to_string().split(':').next(), Some("Insufficient pUSD balance"));
        assert_eq!(ex.released(), 0);
        assert_eq!(ex.usdt_ledger().balance_of(&addr(BUYER)), 1_000_000 * ONE_TOKEN);
        assert_eq!(ex.usdt_ledger().balance_of(&addr(EXCHANGE)), 0);
    }

    #[test]
    fn buyer_without_usdt_is_rejected() {
        let mut ex = setup();
        let poor = addr(0x20);
        ex.usdt_ledger_mut().approve(&poor, &addr(EXCHANGE), ONE_TOKEN);
        assert_eq!(
            ex.buy(poor, ONE_TOKEN),
            Err(ExchangeError::InsufficientUsdtBalance { have: 0, need: ONE_TOKEN })
        );
    }

    #[test]
    fn buying_exactly_stage1_lands_on_boundary() {
        let mut ex = setup();
        ex.usdt_ledger_mut().mint(&addr(BUYER), STAGE1_MAX).unwrap();

        let out = ex.buy(addr(BUYER), STAGE1_MAX / STAGE1_RATE).unwrap();
        assert_eq!(out, STAGE1_MAX);
        assert_eq!(ex.released(), STAGE1_MAX);
        assert_eq!(ex.get_rate(), STAGE1_RATE);
        assert_eq!(ex.stage(), Stage::Linear);

        ex.buy(addr(BUYER), 10_000 * ONE_TOKEN).unwrap();
        assert!(ex.released() > STAGE1_MAX && ex.released() < STAGE2_MAX);
        let progress = ex.released() - STAGE1_MAX;
        let span = STAGE2_MAX - STAGE1_MAX;
        let expected = STAGE1_RATE - (STAGE1_RATE - STAGE3_RATE) * progress / span;
        assert_eq!(ex.get_rate(), expected);
    }

    #[test]
    fn stage3_rate_and_sold_out_curve() {
        let mut ex = setup();
        ex.released = STAGE2_MAX;
        assert_eq!(ex.get_rate(), STAGE3_RATE);
        assert_eq!(ex.stage(), Stage::Low);

        ex.released = PUSD_TOTAL_SUPPLY - 5;
        assert_eq!(
            ex.buy(addr(BUYER), 8),
            Err(ExchangeError::CurveExhausted { unspent: 3 })
        );
        assert_eq!(ex.buy(addr(BUYER), 5), Ok(5));
        assert_eq!(ex.released(), PUSD_TOTAL_SUPPLY);
        assert_eq!(ex.remaining_supply(), 0);
        assert_eq!(
            ex.buy(addr(BUYER), 1),
            Err(ExchangeError::CurveExhausted { unspent: 1 })
        );
    }

    #[test]
    fn one_base_unit_near_end_of_linear_stage() {
        let mut ex = setup();
        ex.released = STAGE2_MAX - 1;
        assert_eq!(ex.get_rate(), 2);
        assert_eq!(ex.calculate_purchase_amount(1).unwrap(), 1);
        assert_eq!(ex.buy(addr(BUYER), 1), Ok(1));
        assert_eq!(ex.released(), STAGE2_MAX);
        assert_eq!(ex.get_rate(), STAGE3_RATE);
    }

    #[test]
    fn quote_matches_execution() {
        let mut ex = setup();
        ex.usdt_ledger_mut().mint(&addr(BUYER), STAGE1_MAX).unwrap();
        ex.released = STAGE1_MAX - 3 * ONE_TOKEN;

        let usdt_in = 250_000 * ONE_TOKEN;
        let quoted = ex.calculate_purchase_amount(usdt_in).unwrap();
        let again = ex.calculate_purchase_amount(usdt_in).unwrap();
        assert_eq!(quoted, again);

        let before = ex.released();
        let got = ex.buy(addr(BUYER), usdt_in).unwrap();
        assert_eq!(got, quoted);
        assert_eq!(ex.released(), before + got);
    }

    #[test]
    fn withdraw_rules() {
        let mut ex = setup();
        assert_eq!(
            ex.withdraw_usdt(addr(BUYER), addr(BUYER)),
            Err(ExchangeError::NotOwner)
        );
        assert_eq!(
            ex.withdraw_usdt(addr(OWNER), addr(OWNER)),
            Err(ExchangeError::NothingToWithdraw)
        );

        ex.buy(addr(BUYER), 100 * ONE_TOKEN).unwrap();
        assert_eq!(
            ex.withdraw_usdt(addr(OWNER), Address::ZERO),
            Err(ExchangeError::InvalidAddress)
        );

        let released = ex.released();
        let amount = ex.withdraw_usdt(addr(OWNER), addr(0x30)).unwrap();
        assert_eq!(amount, 100 * ONE_TOKEN);
        assert_eq!(ex.usdt_ledger().balance_of(&addr(0x30)), amount);
        assert_eq!(ex.usdt_ledger().balance_of(&addr(EXCHANGE)), 0);
        assert_eq!(ex.released(), released);
        assert_eq!(
            ex.events().last(),
            Some(&ExchangeEvent::UsdtWithdrawn { to: addr(0x30), amount })
        );
    }

    #[test]
    fn ownership_transfer() {
        let mut ex = setup();
        assert_eq!(
            ex.transfer_ownership(addr(BUYER), addr(BUYER)),
            Err(ExchangeError::NotOwner)
        );
        assert_eq!(
            ex.transfer_ownership(addr(OWNER), Address::ZERO),
            Err(ExchangeError::InvalidAddress)
        );
        ex.transfer_ownership(addr(OWNER), addr(0x02)).unwrap();
        assert_eq!(ex.owner(), addr(0x02));

        ex.buy(addr(BUYER), ONE_TOKEN).unwrap();
        assert_eq!(ex.withdraw_usdt(addr(OWNER), addr(OWNER)), Err(ExchangeError::NotOwner));
        assert_eq!(ex.withdraw_usdt(addr(0x02), addr(0x02)), Ok(ONE_TOKEN));

        let events = ex.drain_events();
        assert_eq!(events.len(), 3);
        assert!(ex.events().is_empty());
    }

    /// Ledger wrapper that refuses outgoing transfers from `frozen`.
    #[derive(Default)]
    struct FrozenLedger {
        inner: MemoryLedger,
        frozen: Address,
        refuse_pulls: bool,
    }

    impl TokenLedger for FrozenLedger {
        fn balance_of(&self, account: &Address) -> Amount {
            self.inner.balance_of(account)
        }
        fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
            self.inner.allowance(owner, spender)
        }
        fn transfer(&mut self, sender: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
            if *sender == self.frozen {
                return Err(LedgerError::Other("frozen".into()));
            }
            self.inner.transfer(sender, to, amount)
        }
        fn transfer_from(
            &mut self,
            spender: &Address,
            from: &Address,
            to: &Address,
            amount: Amount,
        ) -> Result<(), LedgerError> {
            if self.refuse_pulls {
                return Err(LedgerError::Other("frozen".into()));
            }
            self.inner.transfer_from(spender, from, to, amount)
        }
    }

    fn frozen_config() -> ExchangeConfig {
        ExchangeConfig {
            address: addr(EXCHANGE),
            owner: addr(OWNER),
            usdt_token: addr(0xA1),
            pusd_token: addr(0xA2),
            curve: CurveConfig::default(),
        }
    }

    #[test]
    fn failed_payout_leaves_allowance_and_balances() {
        let config = frozen_config();
        let mut usdt = MemoryLedger::new("USDT", config.usdt_token);
        usdt.mint(&addr(BUYER), 10 * ONE_TOKEN).unwrap();
        usdt.approve(&addr(BUYER), &addr(EXCHANGE), 5 * ONE_TOKEN);
        let mut pusd = FrozenLedger {
            frozen: addr(EXCHANGE),
            ..FrozenLedger::default()
        };
        pusd.inner.mint(&addr(EXCHANGE), PUSD_TOTAL_SUPPLY).unwrap();

        let mut ex = Exchange::new(config, usdt, pusd).unwrap();
        let err = ex.buy(addr(BUYER), ONE_TOKEN).unwrap_err();
        assert!(matches!(err, ExchangeError::Ledger(LedgerError::Other(_))));
        assert_eq!(ex.released(), 0);
        assert_eq!(ex.usdt_ledger().allowance(&addr(BUYER), &addr(EXCHANGE)), 5 * ONE_TOKEN);
        assert_eq!(ex.usdt_ledger().balance_of(&addr(BUYER)), 10 * ONE_TOKEN);
        assert_eq!(ex.usdt_ledger().balance_of(&addr(EXCHANGE)), 0);
        assert_eq!(ex.pusd_ledger().balance_of(&addr(EXCHANGE)), PUSD_TOTAL_SUPPLY);
        assert!(ex.events().is_empty());
    }

    #[test]
    fn failed_pull_returns_the_payout() {
        let config = frozen_config();
        let mut usdt = FrozenLedger {
            refuse_pulls: true,
            ..FrozenLedger::default()
        };
        usdt.inner.mint(&addr(BUYER), 10 * ONE_TOKEN).unwrap();
        usdt.inner.approve(&addr(BUYER), &addr(EXCHANGE), 5 * ONE_TOKEN);
        let mut pusd = MemoryLedger::new("pUSD", config.pusd_token);
        pusd.mint(&addr(EXCHANGE), PUSD_TOTAL_SUPPLY).unwrap();

        let mut ex = Exchange::new(config, usdt, pusd).unwrap();
        let err = ex.buy(addr(BUYER), ONE_TOKEN).unwrap_err();
        assert!(matches!(err, ExchangeError::Ledger(LedgerError::Other(_))));
        assert_eq!(ex.released(), 0);
        assert_eq!(ex.pusd_ledger().balance_of(&addr(BUYER)), 0);
        assert_eq!(ex.pusd_ledger().balance_of(&addr(EXCHANGE)), PUSD_TOTAL_SUPPLY);
        assert_eq!(ex.usdt_ledger().allowance(&addr(BUYER), &addr(EXCHANGE)), 5 * ONE_TOKEN);
        assert_eq!(ex.usdt_ledger().balance_of(&addr(BUYER)), 10 * ONE_TOKEN);
        assert!(ex.events().is_empty());
    }

    #[test]
    fn finite_allowance_is_spent_by_exactly_one_purchase() {
        let mut ex = setup();
        ex.usdt_ledger_mut().approve(&addr(BUYER), &addr(EXCHANGE), 5 * ONE_TOKEN);
        ex.buy(addr(BUYER), 2 * ONE_TOKEN).unwrap();
        assert_eq!(ex.usdt_ledger().allowance(&addr(BUYER), &addr(EXCHANGE)), 3 * ONE_TOKEN);
    }

    #[test]
    fn zero_amount_reported_before_zero_buyer() {
        let mut ex = setup();
        assert_eq!(ex.buy(Address::ZERO, 0), Err(ExchangeError::InvalidAmount));
        assert_eq!(ex.buy(Address::ZERO, ONE_TOKEN), Err(ExchangeError::InvalidAddress));
    }

    #[test]
    fn event_log_keeps_most_recent_until_drained() {
        let mut ex = setup();
        for i in 0..EVENT_LOG_CAPACITY as u128 + 3 {
            ex.record(ExchangeEvent::UsdtWithdrawn { to: addr(0x30), amount: i });
        }
        assert_eq!(ex.events().len(), EVENT_LOG_CAPACITY);
        assert_eq!(
            ex.events().first(),
            Some(&ExchangeEvent::UsdtWithdrawn { to: addr(0x30), amount: 3 })
        );

        assert_eq!(ex.drain_events().len(), EVENT_LOG_CAPACITY);
        ex.buy(addr(BUYER), ONE_TOKEN).unwrap();
        assert_eq!(ex.events().len(), 1);
    }
}
