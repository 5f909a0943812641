//! Fixed exchange-rate table
//!
//! Rates are expressed as the value of one minor unit in INR. Conversion is a
//! pure function; the converted amount is computed by the caller before the
//! cross-currency transfer transaction is opened.

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::currency::Currency;
use crate::error::{LedgerError, Result};

/// Value of one unit of `currency` in INR, `None` if unpriced.
pub fn inr_value(currency: Currency) -> Option<Decimal> {
    match currency {
        Currency::INR => Some(Decimal::ONE),
        Currency::USD => Some(Decimal::from(83)),
        Currency::EUR => Some(Decimal::from(90)),
    }
}

/// Result of converting an amount between two currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub from: Currency,
    pub to: Currency,
    pub from_amount: i64,
    pub to_amount: i64,
    pub rate: Decimal,
}

/// Exchange rate applied when moving money from `from` to `to`.
pub fn rate(from: Currency, to: Currency) -> Result<Decimal> {
    let unsupported = || LedgerError::ConversionUnsupported { from, to };
    let from_value = inr_value(from).ok_or_else(unsupported)?;
    let to_value = inr_value(to).ok_or_else(unsupported)?;
    if to_value.is_zero() {
        return Err(unsupported());
    }
    from_value.checked_div(to_value).ok_or_else(unsupported)
}

/// Convert `amount` minor units of `from` into `to`, rounding half away from zero.
///
/// `rate` in the result is informational; the amount is computed from the
/// table values directly.
pub fn convert_amount(amount: i64, from: Currency, to: Currency) -> Result<Conversion> {
    let rate = rate(from, to)?;
    let unsupported = || LedgerError::ConversionUnsupported { from, to };
    let from_value = inr_value(from).ok_or_else(unsupported)?;
    let to_value = inr_value(to).ok_or_else(unsupported)?;

    // multiply before dividing so exact halves stay exact
    let to_amount = Decimal::from(amount)
        .checked_mul(from_value)
        .and_then(|v| v.checked_div(to_value))
        .ok_or(LedgerError::InvalidAmount)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(LedgerError::InvalidAmount)?;

    Ok(Conversion {
        from,
        to,
        from_amount: amount,
        to_amount,
        rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_currency_rate_is_one() {
        for c in Currency::ALL {
            assert_eq!(rate(c, c).unwrap(), Decimal::ONE);
        }
    }

    #[test]
    fn test_usd_to_inr() {
        let conv = convert_amount(100, Currency::USD, Currency::INR).unwrap();
        assert_eq!(conv.to_amount, 8300);
        assert_eq!(conv.rate, Decimal::from(83));
        assert_eq!(conv.from_amount, 100);
    }

    #[test]
    fn test_inr_to_eur_rounds_half_away_from_zero() {
        // 45 / 90 = 0.5 -> 1
        let conv = convert_amount(45, Currency::INR, Currency::EUR).unwrap();
        assert_eq!(conv.to_amount, 1);
        // 44 / 90 = 0.488... -> 0
        let conv = convert_amount(44, Currency::INR, Currency::EUR).unwrap();
        assert_eq!(conv.to_amount, 0);
    }

    #[test]
    fn test_exact_halves_round_up_in_magnitude() {
        // 135 / 90 = 1.5, 225 / 90 = 2.5
        assert_eq!(convert_amount(135, Currency::INR, Currency::EUR).unwrap().to_amount, 2);
        assert_eq!(convert_amount(225, Currency::INR, Currency::EUR).unwrap().to_amount, 3);
        // -45 / 90 = -0.5
        assert_eq!(convert_amount(-45, Currency::INR, Currency::EUR).unwrap().to_amount, -1);
        // 83 * 45 / 90 = 41.5
        assert_eq!(convert_amount(45, Currency::USD, Currency::EUR).unwrap().to_amount, 42);
    }

    #[test]
    fn test_usd_to_eur() {
        // 1000 * 83 / 90 = 922.22...
        let conv = convert_amount(1000, Currency::USD, Currency::EUR).unwrap();
        assert_eq!(conv.to_amount, 922);
        assert!(conv.rate < Decimal::ONE);
    }
}
