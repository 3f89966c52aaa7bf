// src/curve.rs

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uint::construct_uint;

use crate::types::Amount;
use crate::units::ONE_TOKEN;

construct_uint! {
    /// Minimal fixed-width 256-bit integer used for precise intermediate math.
    pub struct U256(4);
}

/// Both tokens use 18 decimals.
pub const TOKEN_DECIMALS: u32 = 18;

/// 4 trillion pUSD.
pub const PUSD_TOTAL_SUPPLY: Amount = 4_000_000_000_000 * ONE_TOKEN;
/// End of the flat high-rate stage (1 trillion pUSD released).
pub const STAGE1_MAX: Amount = 1_000_000_000_000 * ONE_TOKEN;
/// End of the linear stage (3 trillion pUSD released).
pub const STAGE2_MAX: Amount = 3_000_000_000_000 * ONE_TOKEN;
/// pUSD per USDT while stage 1 lasts.
pub const STAGE1_RATE: u128 = 100_000;
/// pUSD per USDT once stage 3 is reached.
pub const STAGE3_RATE: u128 = 1;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveError {
    #[error("invalid curve configuration")]
    InvalidConfig,
    #[error("step is past the end of the curve")]
    OutOfRange,
    #[error("input amount must be greater than 0")]
    ZeroInput,
    #[error("requested amount exceeds what is left on the curve")]
    ExceedsPool,
    #[error("arithmetic overflow")]
    Overflow,
}

fn mul_u256(a: U256, b: U256) -> Result<U256, CurveError> {
    let (res, overflow) = a.overflowing_mul(b);
    if overflow {
        Err(CurveError::Overflow)
    } else {
        Ok(res)
    }
}

fn add_u256(a: U256, b: U256) -> Result<U256, CurveError> {
    let (res, overflow) = a.overflowing_add(b);
    if overflow {
        Err(CurveError::Overflow)
    } else {
        Ok(res)
    }
}

fn sub_u256(a: U256, b: U256) -> Result<U256, CurveError> {
    let (res, underflow) = a.overflowing_sub(b);
    if underflow {
        Err(CurveError::Overflow)
    } else {
        Ok(res)
    }
}

/// ceil(num / den); `den` is never zero at the call sites.
fn div_ceil_u256(num: U256, den: U256) -> U256 {
    let q = num / den;
    if (q * den) == num {
        q
    } else {
        q + U256::one()
    }
}

fn narrow_u256(value: U256) -> Result<u128, CurveError> {
    if value.bits() > 128 {
        Err(CurveError::Overflow)
    } else {
        Ok(value.low_u128())
    }
}

/// Config for the curve (all amounts in pUSD base units):
/// - total_supply: pUSD sellable over the whole curve
/// - stage1_max: released total where the flat high-rate stage ends
/// - stage2_max: released total where the linear stage ends
/// - stage1_rate / stage3_rate: pUSD per USDT at either flat end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveConfig {
    pub total_supply: u128,
    pub stage1_max: u128,
    pub stage2_max: u128,
    pub stage1_rate: u128,
    pub stage3_rate: u128,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            total_supply: PUSD_TOTAL_SUPPLY,
            stage1_max: STAGE1_MAX,
            stage2_max: STAGE2_MAX,
            stage1_rate: STAGE1_RATE,
            stage3_rate: STAGE3_RATE,
        }
    }
}

impl CurveConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Rate regime of a released total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// `[0, stage1_max)`: flat at `stage1_rate`.
    High,
    /// `[stage1_max, stage2_max)`: linear from `stage1_rate` towards `stage3_rate`.
    Linear,
    /// `[stage2_max, total_supply]`: flat at `stage3_rate`.
    Low,
}

/// Outcome of pricing a USDT input against the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Purchase {
    pub start_step: u128,
    pub end_step: u128,
    pub quote_in: u128,
    /// Part of `quote_in` the curve actually absorbs.
    pub quote_spent: u128,
    pub asset_out: u128,
}

impl Purchase {
    /// Input left over because the curve ran out.
    #[inline]
    pub fn unspent(&self) -> u128 {
        self.quote_in - self.quote_spent
    }
}

/// Three-stage piecewise bonding curve.
///
/// `step` is the released total: pUSD base units already sold.
///
/// ```text
///   rate
///   R1 ┤━━━━━━━━━━╮
///      │           ╲
///      │            ╲
///   R3 ┤             ╰━━━━━━━━━━
///      └──────┬──────────┬──────┬─▶ step
///          stage1_max stage2_max total
/// ```
///
/// The linear stage is priced with the average of the (continuous) rates at
/// both ends of each advance. With `span = stage2_max - stage1_max`,
/// `D = R1 - R3`, `p0 = step - stage1_max` and `n0 = R1*span - D*p0`:
///
///   advance(x) = floor(2*x*n0 / (2*span + x*D))
///   cost(room) = ceil(2*room*span / (2*n0 - D*room))
#[derive(Debug, Clone)]
pub struct Curve {
    // Immutable config
    pub total_supply: u128,
    pub stage1_max: u128,
    pub stage2_max: u128,
    pub stage1_rate: u128,
    pub stage3_rate: u128,

    // Derived
    pub span: u128,      // stage2_max - stage1_max
    pub rate_drop: u128, // stage1_rate - stage3_rate
}

impl Curve {
    pub fn new(cfg: CurveConfig) -> Result<Self, CurveError> {
        if cfg.stage1_max == 0
            || cfg.stage1_max >= cfg.stage2_max
            || cfg.stage2_max >= cfg.total_supply
        {
            return Err(CurveError::InvalidConfig);
        }
        if cfg.stage3_rate == 0 || cfg.stage1_rate < cfg.stage3_rate {
            return Err(CurveError::InvalidConfig);
        }

        // The linear-stage numerators must fit for any u128 input.
        let n_max = mul_u256(U256::from(cfg.stage1_rate), U256::from(cfg.stage2_max))?;
        mul_u256(mul_u256(n_max, U256::from(2u8))?, U256::from(u128::MAX))?;

        Ok(Self {
            total_supply: cfg.total_supply,
            stage1_max: cfg.stage1_max,
            stage2_max: cfg.stage2_max,
            stage1_rate: cfg.stage1_rate,
            stage3_rate: cfg.stage3_rate,
            span: cfg.stage2_max - cfg.stage1_max,
            rate_drop: cfg.stage1_rate - cfg.stage3_rate,
        })
    }

    /// Curve with the production constants, which are known to be valid.
    pub fn from_default() -> Self {
        Self {
            total_supply: PUSD_TOTAL_SUPPLY,
            stage1_max: STAGE1_MAX,
            stage2_max: STAGE2_MAX,
            stage1_rate: STAGE1_RATE,
            stage3_rate: STAGE3_RATE,
            span: STAGE2_MAX - STAGE1_MAX,
            rate_drop: STAGE1_RATE - STAGE3_RATE,
        }
    }

    pub fn config(&self) -> CurveConfig {
        CurveConfig {
            total_supply: self.total_supply,
            stage1_max: self.stage1_max,
            stage2_max: self.stage2_max,
            stage1_rate: self.stage1_rate,
            stage3_rate: self.stage3_rate,
        }
    }

    /// Max step (i.e. total_supply).
    #[inline]
    pub fn max_step(&self) -> u128 {
        self.total_supply
    }

    fn check_step(&self, step: u128) -> Result<(), CurveError> {
        if step > self.total_supply {
            return Err(CurveError::OutOfRange);
        }
        Ok(())
    }

    pub fn stage_at(&self, step: u128) -> Stage {
        if step < self.stage1_max {
            Stage::High
        } else if step < self.stage2_max {
            Stage::Linear
        } else {
            Stage::Low
        }
    }

    /// Marginal rate (pUSD per USDT) at `step`.
    ///
    /// Inside the linear stage: `R1 - floor(D * progress / span)`.
    pub fn rate_at(&self, step: u128) -> u128 {
        match self.stage_at(step) {
            Stage::High => self.stage1_rate,
            Stage::Low => self.stage3_rate,
            Stage::Linear => {
                let progress = U256::from(step - self.stage1_max);
                // D * progress < D * span, which Curve::new proved fits.
                let drop = (U256::from(self.rate_drop) * progress) / U256::from(self.span);
                self.stage1_rate - drop.low_u128()
            }
        }
    }

    /// Price `quote_in` USDT starting at `step`, crossing as many stage
    /// boundaries as the input reaches.
    pub fn quote(&self, step: u128, quote_in: u128) -> Result<Purchase, CurveError> {
        self.check_step(step)?;

        let mut remaining = U256::from(quote_in);
        let mut cursor = step;
        let mut out: u128 = 0;

        while !remaining.is_zero() && cursor < self.total_supply {
            let (advance, spent) = match self.stage_at(cursor) {
                Stage::High => {
                    Self::flat_segment(self.stage1_rate, self.stage1_max - cursor, remaining)?
                }
                Stage::Linear => self.linear_segment(cursor, remaining)?,
                Stage::Low => {
                    Self::flat_segment(self.stage3_rate, self.total_supply - cursor, remaining)?
                }
            };
            remaining = sub_u256(remaining, spent)?;
            cursor += advance;
            out += advance;
        }

        let spent = quote_in - narrow_u256(remaining)?;
        Ok(Purchase {
            start_step: step,
            end_step: cursor,
            quote_in,
            quote_spent: spent,
            asset_out: out,
        })
    }

    /// Flat segment: returns (advance, input consumed).
    fn flat_segment(rate: u128, room: u128, input: U256) -> Result<(u128, U256), CurveError> {
        let full = mul_u256(input, U256::from(rate))?;
        let room_u = U256::from(room);
        if full <= room_u {
            return Ok((narrow_u256(full)?, input));
        }
        let cost = div_ceil_u256(room_u, U256::from(rate));
        Ok((room, cost))
    }

    /// Linear segment from `cursor`: returns (advance, input consumed).
    fn linear_segment(&self, cursor: u128, input: U256) -> Result<(u128, U256), CurveError> {
        let span = U256::from(self.span);
        let drop = U256::from(self.rate_drop);
        let room = self.stage2_max - cursor;
        let room_u = U256::from(room);
        let n0 = self.scaled_rate(cursor)?;

        let num = mul_u256(mul_u256(U256::from(2u8), input)?, n0)?;
        let den = add_u256(mul_u256(U256::from(2u8), span)?, mul_u256(input, drop)?)?;
        let advance = num / den;
        if advance < room_u {
            return Ok((narrow_u256(advance)?, input));
        }

        let cost = self.linear_fill_cost(cursor)?;
        Ok((room, cost))
    }

    /// `n0 = R1*span - D*(cursor - stage1_max)`: the continuous rate at
    /// `cursor`, scaled by `span`.
    fn scaled_rate(&self, cursor: u128) -> Result<U256, CurveError> {
        let span = U256::from(self.span);
        let progress = U256::from(cursor - self.stage1_max);
        sub_u256(
            mul_u256(U256::from(self.stage1_rate), span)?,
            mul_u256(U256::from(self.rate_drop), progress)?,
        )
    }

    /// Input needed to move from `cursor` to `stage2_max`.
    fn linear_fill_cost(&self, cursor: u128) -> Result<U256, CurveError> {
        let span = U256::from(self.span);
        let drop = U256::from(self.rate_drop);
        let room_u = U256::from(self.stage2_max - cursor);
        let n0 = self.scaled_rate(cursor)?;

        let num = mul_u256(mul_u256(U256::from(2u8), room_u)?, span)?;
        // 2*n0 - D*room >= 2*R3*span > 0
        let den = sub_u256(mul_u256(U256::from(2u8), n0)?, mul_u256(drop, room_u)?)?;
        Ok(div_ceil_u256(num, den))
    }

    pub fn asset_out_given_quote_in(&self, step: u128, quote_in: u128) -> Result<u128, CurveError> {
        Ok(self.quote(step, quote_in)?.asset_out)
    }

    /// Exact USDT needed to buy everything left from `step`.
    pub fn quote_to_exhaust(&self, step: u128) -> Result<u128, CurveError> {
        self.check_step(step)?;

        let mut cursor = step;
        let mut total = U256::zero();
        while cursor < self.total_supply {
            let (next, cost) = match self.stage_at(cursor) {
                Stage::High => (
                    self.stage1_max,
                    div_ceil_u256(
                        U256::from(self.stage1_max - cursor),
                        U256::from(self.stage1_rate),
                    ),
                ),
                Stage::Linear => (self.stage2_max, self.linear_fill_cost(cursor)?),
                Stage::Low => (
                    self.total_supply,
                    div_ceil_u256(
                        U256::from(self.total_supply - cursor),
                        U256::from(self.stage3_rate),
                    ),
                ),
            };
            total = add_u256(total, cost)?;
            cursor = next;
        }
        narrow_u256(total)
    }

    /// Smallest USDT input whose quote reaches `asset_out` pUSD.
    pub fn quote_in_given_asset_out(
        &self,
        step: u128,
        asset_out: u128,
    ) -> Result<u128, CurveError> {
        self.check_step(step)?;
        if asset_out == 0 {
            return Ok(0);
        }
        if asset_out > self.total_supply - step {
            return Err(CurveError::ExceedsPool);
        }

        let mut lo = 1u128;
        let mut hi = self.quote_to_exhaust(step)?;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let out = self.asset_out_given_quote_in(step, mid)?;
            if out >= asset_out {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }

        Ok(lo)
    }

    /// Price a sequence of purchases, each starting where the previous ended.
    /// Returns `(start_step, asset_out)` per purchase.
    pub fn simulate_purchases(
        &self,
        step: u128,
        purchases: &[u128],
    ) -> Result<Vec<(u128, u128)>, CurveError> {
        let mut current_step = step;
        let mut results = Vec::with_capacity(purchases.len());

        for &quote_in in purchases {
            if quote_in == 0 {
                return Err(CurveError::ZeroInput);
            }
            let purchase = self.quote(current_step, quote_in)?;
            results.push((current_step, purchase.asset_out));
            current_step = purchase.end_step;
        }

        Ok(results)
    }

    /// Share of the curve sold at `step`, in basis points.
    pub fn progress_bps(&self, step: u128) -> u128 {
        let sold = U256::from(step.min(self.total_supply)) * U256::from(10_000u32);
        (sold / U256::from(self.total_supply)).low_u128()
    }
}
