// src/lib.rs

// Curve math and settlement are pure Rust; `wasm` only adapts the curve for JS.
mod curve;
mod events;
mod exchange;
mod ledger;
mod shared;
mod types;
mod units;
mod wasm;

pub use crate::curve::{
    Curve, CurveConfig, CurveError, Purchase, Stage, PUSD_TOTAL_SUPPLY, STAGE1_MAX, STAGE1_RATE,
    STAGE2_MAX, STAGE3_RATE, TOKEN_DECIMALS, U256,
};
pub use crate::events::ExchangeEvent;
pub use crate::exchange::{Exchange, ExchangeConfig, ExchangeError, EVENT_LOG_CAPACITY};
pub use crate::ledger::{LedgerError, MemoryLedger, TokenLedger};
pub use crate::shared::SharedExchange;
pub use crate::types::{Address, AddressError, Amount};
pub use crate::units::{format_token_amount, parse_token_amount, UnitsError, ONE_TOKEN};
pub use crate::wasm::{WasmCurve, WasmQuote};
