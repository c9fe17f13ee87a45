//! Fee calculation - Rental fees and overdue fines.
//!
//! Pure functions: amounts are computed in integer minor units (cents), which is what the
//! payment gateway takes, and converted back to 2-place decimals for storage and display.
//! Day counts are plain calendar subtraction and must be positive.

use crate::errors::{Error, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Multiplier applied to overdue days when none is configured
pub const DEFAULT_FINE_MULTIPLIER: u32 = 2;

/// A computed charge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fee {
    /// Days billed
    pub days: i64,
    /// Total in minor currency units
    pub minor_units: i64,
}

impl Fee {
    /// Total as a 2-place major-unit amount.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        from_minor_units(self.minor_units)
    }
}

/// Number of calendar days from `from` to `to`.
///
/// Fails with [`Error::Validation`] unless `to` is strictly after `from`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> Result<i64> {
    let days = (to - from).num_days();
    if days <= 0 {
        return Err(Error::validation(format!(
            "{to} must be after {from} to bill any days"
        )));
    }
    Ok(days)
}

/// Converts a major-unit amount with at most two decimal places to minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    let normalized = amount.normalize();
    if normalized.scale() > 2 {
        return Err(Error::validation(format!(
            "{amount} has more than two decimal places"
        )));
    }
    (normalized * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| Error::validation(format!("{amount} is out of range")))
}

/// Converts minor units back to a 2-place major-unit amount.
#[must_use]
pub fn from_minor_units(minor_units: i64) -> Decimal {
    Decimal::new(minor_units, 2)
}

fn daily_total(daily_fees: &[Decimal]) -> Result<i64> {
    daily_fees.iter().try_fold(0_i64, |total, fee| {
        let cents = to_minor_units(*fee)?;
        total
            .checked_add(cents)
            .ok_or_else(|| Error::validation("daily fee total overflows"))
    })
}

fn charge(days: i64, daily_fees: &[Decimal], multiplier: i64) -> Result<Fee> {
    let minor_units = daily_total(daily_fees)?
        .checked_mul(days)
        .and_then(|total| total.checked_mul(multiplier))
        .ok_or_else(|| Error::validation("fee overflows"))?;
    Ok(Fee { days, minor_units })
}

/// Rental fee: days from borrowing to expected return times the summed daily fees.
pub fn rental_fee(
    borrow_date: NaiveDate,
    expected_return_date: NaiveDate,
    daily_fees: &[Decimal],
) -> Result<Fee> {
    let days = days_between(borrow_date, expected_return_date)?;
    charge(days, daily_fees, 1)
}

/// Overdue fine: days past the expected return date times the summed daily fees times
/// `multiplier`.
pub fn fine_fee(
    expected_return_date: NaiveDate,
    actual_return_date: NaiveDate,
    daily_fees: &[Decimal],
    multiplier: u32,
) -> Result<Fee> {
    let days = days_between(expected_return_date, actual_return_date)?;
    charge(days, daily_fees, i64::from(multiplier))
}
