//! # Money Module
//!
//! Provides the `Money` type for invoice totals, payments and allocations.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Settling in floats:                                                    │
//! │    total 90.00, paid 50.00 + 39.99999999 → "partial" forever  ❌       │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    9000 - (5000 + 4000) = 0 exactly                                    │
//! │    The 1-cent status tolerance is an explicit constant, not a          │
//! │    workaround for drift                                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mizan_core::money::Money;
//! use mizan_core::quantity::Quantity;
//!
//! let unit_price = Money::from_cents(500); // $5.00
//! let line = unit_price.times_quantity(Quantity::from_units(10));
//! assert_eq!(line.cents(), 5000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::quantity::{Quantity, QUANTITY_SCALE};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  InvoiceItem.unit_price × quantity ─► InvoiceItem.total                 │
/// │                                            │                            │
/// │                                            ▼                            │
/// │                              Invoice.total_amount (Σ items)             │
/// │                                            │                            │
/// │  Payment.amount ─► PaymentAllocation ─► Invoice.paid_amount             │
/// │                                            │                            │
/// │  CreditNote.total_amount ─────────► net settlement total               │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use mizan_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // $10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -$5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
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
        Money(self.0.abs())
    }

    /// Clamps negative values to zero.
    ///
    /// Used where a balance is shown or compared as "still owed": a
    /// negative remainder means nothing is owed, not a credit.
    #[inline]
    pub const fn non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Multiplies a unit price by a fixed-point quantity.
    ///
    /// ## Rounding
    /// The exact product is `cents × milli / 1000`. The fractional cent is
    /// rounded half away from zero, so `$0.99 × 0.5 = $0.495 → $0.50`.
    ///
    /// ## Example
    /// ```rust
    /// use mizan_core::money::Money;
    /// use mizan_core::quantity::Quantity;
    ///
    /// let kilo_price = Money::from_cents(1250); // $12.50 / kg
    /// let line = kilo_price.times_quantity(Quantity::from_milli(1_500)); // 1.5 kg
    /// assert_eq!(line.cents(), 1875);
    /// ```
    pub fn times_quantity(&self, quantity: Quantity) -> Money {
        let exact = self.0 as i128 * quantity.milli() as i128;
        Money::from_cents(div_round_half_away(exact, QUANTITY_SCALE as i128) as i64)
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Arguments
    /// * `discount_bps` - Discount in basis points (1000 = 10%)
    ///
    /// ## Example
    /// ```rust
    /// use mizan_core::money::Money;
    ///
    /// let subtotal = Money::from_cents(10000); // $100.00
    /// let discounted = subtotal.apply_percentage_discount(1000); // 10% off
    /// assert_eq!(discounted.cents(), 9000);
    /// ```
    pub fn apply_percentage_discount(&self, discount_bps: u32) -> Money {
        let discount = div_round_half_away(self.0 as i128 * discount_bps as i128, 10_000);
        Money::from_cents(self.0 - discount as i64)
    }
}

/// Integer division rounding the magnitude half-up, symmetric around zero.
fn div_round_half_away(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        -((-numerator + half) / denominator)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, factor: i64) -> Self {
        Money(self.0 * factor)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(9000)), "$90.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::zero()), "$0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(5000);
        let b = Money::from_cents(4000);
        assert_eq!((a + b).cents(), 9000);
        assert_eq!((a - b).cents(), 1000);
        assert_eq!((b * 3).cents(), 12000);

        let total: Money = [a, b, Money::from_cents(1)].iter().sum();
        assert_eq!(total.cents(), 9001);
    }

    #[test]
    fn test_times_quantity_whole_units() {
        let price = Money::from_cents(2000);
        assert_eq!(price.times_quantity(Quantity::from_units(2)).cents(), 4000);
    }

    #[test]
    fn test_times_quantity_rounds_half_away_from_zero() {
        let price = Money::from_cents(99);
        assert_eq!(price.times_quantity(Quantity::from_milli(500)).cents(), 50);
        assert_eq!(price.times_quantity(Quantity::from_milli(-500)).cents(), -50);
        assert_eq!(price.times_quantity(Quantity::from_milli(1)).cents(), 0);
    }

    #[test]
    fn test_percentage_discount() {
        let subtotal = Money::from_cents(10000);
        assert_eq!(subtotal.apply_percentage_discount(1000).cents(), 9000);
        assert_eq!(subtotal.apply_percentage_discount(0).cents(), 10000);
        assert_eq!(subtotal.apply_percentage_discount(10_000).cents(), 0);
    }

    #[test]
    fn test_non_negative() {
        assert_eq!(Money::from_cents(-1).non_negative(), Money::zero());
        assert_eq!(Money::from_cents(7).non_negative().cents(), 7);
    }
}
