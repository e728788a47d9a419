//! Conversions between decimal prices and minor currency units.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of minor units per major unit for two-decimal currencies.
const MINOR_UNITS: i64 = 100;

/// Converts a decimal amount (e.g. `10.00`) to minor units (e.g. `1000`).
///
/// Sub-cent remainders round half away from zero. Returns `None` when the
/// amount does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::from(MINOR_UNITS))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Converts minor units back to a decimal amount with two decimal places.
pub fn from_minor_units(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}
