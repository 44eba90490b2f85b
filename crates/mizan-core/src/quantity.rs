//! # Quantity Module
//!
//! Fixed-point stock quantities.
//!
//! Stock is counted in thousandths of a unit so that fractional goods
//! (kilograms, litres, metres) can be stocked without floating point.
//! Sufficiency checks compare integers exactly, which means the stock
//! ledger never needs an epsilon.
//!
//! ```text
//! Quantity::from_units(5)     → 5000 milli   "5"
//! Quantity::from_milli(2_250) → 2250 milli   "2.25"
//! Quantity::from_milli(1)     →    1 milli   "0.001"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

/// Number of stored sub-units per whole unit.
pub const QUANTITY_SCALE: i64 = 1000;

/// A signed stock quantity in thousandths of a unit.
///
/// Stored rows are never negative (the `stocks` table carries a CHECK
/// constraint); deltas passed to the ledger are signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    /// Creates a quantity of whole units.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * QUANTITY_SCALE)
    }

    /// Raw value in thousandths.
    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Quantity(self.0.abs())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let whole = (self.0 / QUANTITY_SCALE).abs();
        let frac = (self.0 % QUANTITY_SCALE).abs();
        if frac == 0 {
            return write!(f, "{}{}", sign, whole);
        }
        let digits = format!("{:03}", frac);
        write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_and_milli() {
        assert_eq!(Quantity::from_units(5).milli(), 5000);
        assert_eq!(Quantity::from_milli(2250).milli(), 2250);
    }

    #[test]
    fn test_display_trims_trailing_zeros() {
        assert_eq!(Quantity::from_units(10).to_string(), "10");
        assert_eq!(Quantity::from_milli(2250).to_string(), "2.25");
        assert_eq!(Quantity::from_milli(1).to_string(), "0.001");
        assert_eq!(Quantity::from_milli(-1500).to_string(), "-1.5");
    }

    #[test]
    fn test_arithmetic() {
        let mut q = Quantity::from_units(20);
        q -= Quantity::from_units(5);
        assert_eq!(q, Quantity::from_units(15));
        assert_eq!(-q, Quantity::from_units(-15));
        let total: Quantity = vec![Quantity::from_units(1), Quantity::from_milli(500)]
            .into_iter()
            .sum();
        assert_eq!(total.milli(), 1500);
    }
}
