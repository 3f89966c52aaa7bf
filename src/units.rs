// src/units.rs

//! Decimal text <-> base-unit conversion for 18-decimal tokens.

use thiserror::Error;

use crate::types::Amount;

/// One whole token (10^18 base units).
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitsError {
    #[error("not a decimal number: {0:?}")]
    Malformed(String),
    #[error("amount does not fit in 128 bits: {0:?}")]
    TooLarge(String),
}

/// Parse a human amount ("1.5") into base units at `decimals`.
///
/// Fraction digits beyond `decimals` are truncated, not rounded.
/// An empty string is zero.
pub fn parse_token_amount(text: &str, decimals: u32) -> Result<Amount, UnitsError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }

    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return Err(UnitsError::Malformed(text.to_string()));
    }

    let scale = 10u128
        .checked_pow(decimals)
        .ok_or_else(|| UnitsError::TooLarge(text.to_string()))?;
    let whole: Amount = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse::<Amount>()
            .map_err(|_| UnitsError::TooLarge(text.to_string()))?
    };

    let kept = &frac_part[..frac_part.len().min(decimals as usize)];
    let mut frac: Amount = 0;
    for b in kept.bytes() {
        frac = frac * 10 + Amount::from(b - b'0');
    }
    frac *= 10u128.pow(decimals - kept.len() as u32);

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| UnitsError::TooLarge(text.to_string()))
}

/// Render base units as a decimal string with exactly `decimals` fraction digits.
pub fn format_token_amount(amount: Amount, decimals: u32) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }
    if digits.len() <= decimals {
        return format!("0.{}{}", "0".repeat(decimals - digits.len()), digits);
    }
    let (int_part, frac_part) = digits.split_at(digits.len() - decimals);
    format!("{int_part}.{frac_part}")
}
