//! Decimal amount <-> smallest chain unit conversion.
//!
//! Amounts are handled as exact decimal strings so nothing is lost to binary floating point;
//! digits beyond the unit's precision are truncated, never rounded up.

use std::str::FromStr;

use alloy::primitives::U256;
use rust_decimal::Decimal;
use snafu::{ensure, Snafu};

pub const BTC_DECIMALS: u8 = 8;
pub const ETH_DECIMALS: u8 = 18;
pub const TRX_DECIMALS: u8 = 6;
pub const GWEI_DECIMALS: u8 = 9;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum UnitError {
    #[snafu(display("amount must not be negative: {amount}"))]
    NegativeAmount { amount: Decimal },

    #[snafu(display("cannot represent {amount} with {decimals} decimals as an integer: {reason}"))]
    Conversion {
        amount: String,
        decimals: u8,
        reason: String,
    },
}

/// Convert `amount` into an integer count of units with `decimals` decimals
/// (satoshi for 8, wei for 18, sun for 6, token units for the token's decimals).
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256, UnitError> {
    ensure!(
        !amount.is_sign_negative() || amount.is_zero(),
        NegativeAmountSnafu { amount }
    );

    let text = amount.abs().normalize().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let precision = usize::from(decimals);
    let mut digits = String::with_capacity(whole.len() + precision);
    digits.push_str(whole);
    if fraction.len() >= precision {
        digits.push_str(&fraction[..precision]);
    } else {
        digits.push_str(fraction);
        digits.extend(std::iter::repeat_n('0', precision - fraction.len()));
    }

    U256::from_str_radix(&digits, 10).map_err(|e| UnitError::Conversion {
        amount: text.clone(),
        decimals,
        reason: e.to_string(),
    })
}

/// Inverse of [`to_base_units`]; fails when the value does not fit a `Decimal`.
pub fn from_base_units(value: U256, decimals: u8) -> Result<Decimal, UnitError> {
    let digits = value.to_string();
    let precision = usize::from(decimals);
    let text = if digits.len() > precision {
        let (whole, fraction) = digits.split_at(digits.len() - precision);
        format!("{whole}.{fraction}")
    } else {
        format!("0.{digits:0>precision$}")
    };

    Decimal::from_str(text.trim_end_matches('.'))
        .map(|d| d.normalize())
        .map_err(|e| UnitError::Conversion {
            amount: digits.clone(),
            decimals,
            reason: e.to_string(),
        })
}
