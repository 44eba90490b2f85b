//! # Settlement Arithmetic
//!
//! Line totals, invoice totals and the payment-status function.
//!
//! ## Status Function
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  paid <= 0                    → unpaid                                  │
//! │  0 < paid < total - $0.01     → partial                                 │
//! │  paid >= total - $0.01        → paid                                    │
//! │                                                                         │
//! │  `total` here is always the NET settlement total:                       │
//! │     gross invoice total − approved credit notes                         │
//! │  The raw paid figure is kept even when it exceeds the total.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every place that derives a balance goes through [`settlement_total`] and
//! [`remaining_balance`], so the gross/net choice lives in one spot.

use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::PaymentStatus;

/// Paid amounts within this distance of the total count as fully paid.
pub const PAID_TOLERANCE: Money = Money::from_cents(1);

/// Derives the payment status of an invoice.
///
/// ## Example
/// ```rust
/// use mizan_core::money::Money;
/// use mizan_core::settlement::payment_status;
/// use mizan_core::PaymentStatus;
///
/// let total = Money::from_cents(9000);
/// assert_eq!(payment_status(Money::zero(), total), PaymentStatus::Unpaid);
/// assert_eq!(payment_status(Money::from_cents(5000), total), PaymentStatus::Partial);
/// assert_eq!(payment_status(Money::from_cents(8999), total), PaymentStatus::Paid);
/// ```
pub fn payment_status(paid: Money, total: Money) -> PaymentStatus {
    if !paid.is_positive() {
        PaymentStatus::Unpaid
    } else if paid >= total - PAID_TOLERANCE {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    }
}

/// `quantity × unit_price`, less a percentage discount.
///
/// ## Arguments
/// * `discount_bps` - basis points, 10000 = 100 %
pub fn line_total(quantity: Quantity, unit_price: Money, discount_bps: u32) -> Money {
    unit_price
        .times_quantity(quantity)
        .apply_percentage_discount(discount_bps)
}

/// Sum of line totals.
pub fn invoice_total<I>(line_totals: I) -> Money
where
    I: IntoIterator<Item = Money>,
{
    line_totals.into_iter().sum()
}

/// Net amount the counterparty owes in total.
///
/// Approved credit notes reduce the gross invoice total. A credit larger
/// than the invoice (possible when credit-note prices differ from invoice
/// prices) floors the result at zero.
pub fn settlement_total(gross_total: Money, approved_credits: Money) -> Money {
    (gross_total - approved_credits).non_negative()
}

/// What is still owed: `net total − paid`. Negative when overpaid.
pub fn remaining_balance(net_total: Money, paid: Money) -> Money {
    net_total - paid
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_two_line_invoice_totals() {
        let lines = [
            line_total(Quantity::from_units(10), Money::from_cents(500), 0),
            line_total(Quantity::from_units(2), Money::from_cents(2000), 0),
        ];
        let total = invoice_total(lines);
        assert_eq!(total.cents(), 9000);

        assert_eq!(payment_status(Money::from_cents(5000), total), PaymentStatus::Partial);
        assert_eq!(payment_status(Money::from_cents(9000), total), PaymentStatus::Paid);
    }

    #[test]
    fn test_line_total_with_discount() {
        // 3 × $19.99 = $59.97, 15 % off = $50.97 (discount $8.9955 → $9.00)
        let total = line_total(Quantity::from_units(3), Money::from_cents(1999), 1500);
        assert_eq!(total.cents(), 5097);
    }

    #[test]
    fn test_status_tolerance_boundary() {
        let total = Money::from_cents(10000);
        assert_eq!(payment_status(Money::from_cents(9998), total), PaymentStatus::Partial);
        assert_eq!(payment_status(Money::from_cents(9999), total), PaymentStatus::Paid);
        assert_eq!(payment_status(Money::from_cents(12000), total), PaymentStatus::Paid);
    }

    #[test]
    fn test_status_negative_paid_is_unpaid() {
        assert_eq!(
            payment_status(Money::from_cents(-10), Money::from_cents(100)),
            PaymentStatus::Unpaid
        );
    }

    #[test]
    fn test_zero_total_invoice() {
        assert_eq!(payment_status(Money::zero(), Money::zero()), PaymentStatus::Unpaid);
        assert_eq!(payment_status(Money::from_cents(1), Money::zero()), PaymentStatus::Paid);
    }

    #[test]
    fn test_settlement_total_nets_credits() {
        let net = settlement_total(Money::from_cents(10000), Money::from_cents(6000));
        assert_eq!(net.cents(), 4000);
        assert_eq!(remaining_balance(net, Money::from_cents(1000)).cents(), 3000);
        assert_eq!(
            settlement_total(Money::from_cents(100), Money::from_cents(500)),
            Money::zero()
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Status matches the three-way rule for every (paid, total) pair.
        #[test]
        fn prop_status_matches_rule(paid in -100_000i64..1_000_000, total in 0i64..1_000_000) {
            let status = payment_status(Money::from_cents(paid), Money::from_cents(total));
            let expected = if paid <= 0 {
                PaymentStatus::Unpaid
            } else if paid >= total - 1 {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Partial
            };
            prop_assert_eq!(status, expected);
        }

        /// A discounted line never exceeds the undiscounted line and is never negative.
        #[test]
        fn prop_line_total_bounded(
            milli in 1i64..10_000_000,
            price in 0i64..1_000_000,
            bps in 0u32..=10_000,
        ) {
            let qty = Quantity::from_milli(milli);
            let price = Money::from_cents(price);
            let gross = line_total(qty, price, 0);
            let net = line_total(qty, price, bps);
            prop_assert!(net <= gross);
            prop_assert!(!net.is_negative());
        }
    }
}
