// src/wasm.rs

//! JavaScript bindings for the pricing curve.
//!
//! JS numbers cannot hold 18-decimal amounts, so every amount crosses the
//! boundary as a base-unit decimal string (`"1000000000000000000"` is one
//! token). Errors surface as thrown strings.
//!
//! ```typescript
//! const curve = new WasmCurve();
//! curve.rateAt("0");                          // "100000"
//! const q = curve.quote(released, usdtIn);
//! q.pusdOut; q.usdtSpent; q.endReleased;
//! ```

use thiserror::Error;
use wasm_bindgen::prelude::*;

use crate::curve::{Curve, CurveConfig, CurveError, Purchase};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
enum BindingError {
    #[error("invalid amount {0:?}: expected base units as a decimal string")]
    BadAmount(String),
    #[error("invalid curve config: {0}")]
    BadConfig(String),
    #[error(transparent)]
    Curve(#[from] CurveError),
}

impl From<BindingError> for JsValue {
    fn from(err: BindingError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

fn parse_amount(text: &str) -> Result<u128, BindingError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BindingError::BadAmount(text.to_string()));
    }
    trimmed
        .parse::<u128>()
        .map_err(|_| BindingError::BadAmount(text.to_string()))
}

/// Result of pricing a purchase, amounts as base-unit strings.
#[wasm_bindgen]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmQuote {
    pusd_out: String,
    usdt_spent: String,
    usdt_unspent: String,
    end_released: String,
}

impl From<Purchase> for WasmQuote {
    fn from(p: Purchase) -> Self {
        Self {
            pusd_out: p.asset_out.to_string(),
            usdt_spent: p.quote_spent.to_string(),
            usdt_unspent: p.unspent().to_string(),
            end_released: p.end_step.to_string(),
        }
    }
}

#[wasm_bindgen]
impl WasmQuote {
    #[wasm_bindgen(getter = pusdOut)]
    pub fn pusd_out(&self) -> String {
        self.pusd_out.clone()
    }

    #[wasm_bindgen(getter = usdtSpent)]
    pub fn usdt_spent(&self) -> String {
        self.usdt_spent.clone()
    }

    /// Non-zero only when the curve sells out mid-purchase.
    #[wasm_bindgen(getter = usdtUnspent)]
    pub fn usdt_unspent(&self) -> String {
        self.usdt_unspent.clone()
    }

    #[wasm_bindgen(getter = endReleased)]
    pub fn end_released(&self) -> String {
        self.end_released.clone()
    }
}

#[wasm_bindgen]
pub struct WasmCurve {
    inner: Curve,
}

impl WasmCurve {
    fn try_from_json(json: &str) -> Result<Self, BindingError> {
        let cfg = CurveConfig::from_json(json).map_err(|e| BindingError::BadConfig(e.to_string()))?;
        Ok(Self {
            inner: Curve::new(cfg)?,
        })
    }

    fn try_rate_at(&self, released: &str) -> Result<String, BindingError> {
        let step = parse_amount(released)?;
        if step > self.inner.max_step() {
            return Err(CurveError::OutOfRange.into());
        }
        Ok(self.inner.rate_at(step).to_string())
    }

    fn try_quote(&self, released: &str, usdt_in: &str) -> Result<WasmQuote, BindingError> {
        let purchase = self
            .inner
            .quote(parse_amount(released)?, parse_amount(usdt_in)?)?;
        Ok(purchase.into())
    }

    fn try_usdt_for_pusd(&self, released: &str, pusd_out: &str) -> Result<String, BindingError> {
        let cost = self
            .inner
            .quote_in_given_asset_out(parse_amount(released)?, parse_amount(pusd_out)?)?;
        Ok(cost.to_string())
    }

    fn try_remaining_supply(&self, released: &str) -> Result<String, BindingError> {
        let step = parse_amount(released)?;
        if step > self.inner.max_step() {
            return Err(CurveError::OutOfRange.into());
        }
        Ok((self.inner.max_step() - step).to_string())
    }

    fn try_usdt_to_exhaust(&self, released: &str) -> Result<String, BindingError> {
        let cost = self.inner.quote_to_exhaust(parse_amount(released)?)?;
        Ok(cost.to_string())
    }
}

impl Default for WasmCurve {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl WasmCurve {
    /// Curve with the production parameters.
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmCurve {
        Self {
            inner: Curve::from_default(),
        }
    }

    /// Build from a JSON `CurveConfig` (amounts as JSON integers).
    #[wasm_bindgen(js_name = fromConfigJson)]
    pub fn from_config_json(json: &str) -> Result<WasmCurve, JsValue> {
        Ok(Self::try_from_json(json)?)
    }

    #[wasm_bindgen(js_name = totalSupply)]
    pub fn total_supply(&self) -> String {
        self.inner.max_step().to_string()
    }

    #[wasm_bindgen(js_name = rateAt)]
    pub fn rate_at(&self, released: &str) -> Result<String, JsValue> {
        Ok(self.try_rate_at(released)?)
    }

    #[wasm_bindgen(js_name = purchaseAmount)]
    pub fn purchase_amount(&self, released: &str, usdt_in: &str) -> Result<String, JsValue> {
        Ok(self.try_quote(released, usdt_in)?.pusd_out)
    }

    pub fn quote(&self, released: &str, usdt_in: &str) -> Result<WasmQuote, JsValue> {
        Ok(self.try_quote(released, usdt_in)?)
    }

    /// Smallest USDT input that buys at least `pusd_out`.
    #[wasm_bindgen(js_name = usdtForPusd)]
    pub fn usdt_for_pusd(&self, released: &str, pusd_out: &str) -> Result<String, JsValue> {
        Ok(self.try_usdt_for_pusd(released, pusd_out)?)
    }

    #[wasm_bindgen(js_name = remainingSupply)]
    pub fn remaining_supply(&self, released: &str) -> Result<String, JsValue> {
        Ok(self.try_remaining_supply(released)?)
    }

    #[wasm_bindgen(js_name = usdtToExhaust)]
    pub fn usdt_to_exhaust(&self, released: &str) -> Result<String, JsValue> {
        Ok(self.try_usdt_to_exhaust(released)?)
    }

    #[wasm_bindgen(js_name = progressBps)]
    pub fn progress_bps(&self, released: &str) -> Result<u32, JsValue> {
        let step = parse_amount(released)?;
        Ok(self.inner.progress_bps(step) as u32)
    }
}
