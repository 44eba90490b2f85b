//! # Validation Module
//!
//! Input checks run by the engines before any transaction is opened.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: request handler deserializes NewInvoice / NewTransfer / ...   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - shape of the request (positive quantities,     │
//! │           discount range, non-empty item lists, ids present)           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: engines - rules that need data (stock, caps, balances)       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite - CHECK (quantity >= 0), UNIQUE, FOREIGN KEY          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::requests::{
    FifoPayment, NewCreditNote, NewCreditNoteItem, NewInvoice, NewInvoiceItem, NewPayment,
    NewTransfer, UpdateInvoiceItem,
};
use crate::{MAX_DISCOUNT_BPS, MAX_DOCUMENT_LINES};

pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Rejects empty or whitespace-only identifiers.
pub fn validate_id(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Quantities on documents and transfers must be strictly positive.
pub fn validate_quantity(field: &str, quantity: Quantity) -> ValidationResult<()> {
    if !quantity.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Prices may be zero (free goods) but never negative.
pub fn validate_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

pub fn validate_discount_bps(bps: u32) -> ValidationResult<()> {
    if bps > MAX_DISCOUNT_BPS {
        return Err(ValidationError::OutOfRange {
            field: "discount_bps".to_string(),
            min: 0,
            max: MAX_DISCOUNT_BPS as i64,
        });
    }
    Ok(())
}

/// Payments must move money.
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    Ok(())
}

/// Documents need at least one line and at most [`MAX_DOCUMENT_LINES`].
pub fn validate_line_count(field: &str, count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if count > MAX_DOCUMENT_LINES {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_DOCUMENT_LINES as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Request Validators
// =============================================================================

pub fn validate_invoice_item(item: &NewInvoiceItem) -> ValidationResult<()> {
    validate_id("product_id", &item.product_id)?;
    validate_quantity("quantity", item.quantity)?;
    validate_price("unit_price", item.unit_price)?;
    validate_discount_bps(item.discount_bps)
}

pub fn validate_new_invoice(invoice: &NewInvoice) -> ValidationResult<()> {
    validate_id("location_id", &invoice.location_id)?;
    validate_line_count("items", invoice.items.len())?;
    invoice.items.iter().try_for_each(validate_invoice_item)?;

    if invoice.paid_amount.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "paid_amount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    if invoice.paid_amount.is_positive() && invoice.payment_method.is_none() {
        return Err(ValidationError::Required {
            field: "payment_method".to_string(),
        });
    }
    Ok(())
}

pub fn validate_item_update(update: &UpdateInvoiceItem) -> ValidationResult<()> {
    validate_id("product_id", &update.product_id)?;
    validate_quantity("quantity", update.quantity)?;
    validate_price("unit_price", update.unit_price)?;
    validate_discount_bps(update.discount_bps)
}

pub fn validate_transfer(transfer: &NewTransfer) -> ValidationResult<()> {
    validate_id("from_location_id", &transfer.from_location_id)?;
    validate_id("to_location_id", &transfer.to_location_id)?;
    if transfer.from_location_id == transfer.to_location_id {
        return Err(ValidationError::InvalidFormat {
            field: "to_location_id".to_string(),
            reason: "must differ from the source location".to_string(),
        });
    }
    validate_line_count("items", transfer.items.len())?;
    for line in &transfer.items {
        validate_id("product_id", &line.product_id)?;
        validate_quantity("quantity", line.quantity)?;
    }
    Ok(())
}

pub fn validate_payment(payment: &NewPayment) -> ValidationResult<()> {
    validate_id("invoice_id", &payment.invoice_id)?;
    validate_payment_amount(payment.amount)
}

pub fn validate_fifo_payment(payment: &FifoPayment) -> ValidationResult<()> {
    validate_id("counterparty_id", &payment.counterparty_id)?;
    validate_payment_amount(payment.amount)
}

pub fn validate_credit_note_items(items: &[NewCreditNoteItem]) -> ValidationResult<()> {
    validate_line_count("items", items.len())?;
    for item in items {
        validate_id("product_id", &item.product_id)?;
        validate_quantity("quantity", item.quantity)?;
        validate_price("unit_price", item.unit_price)?;
    }
    Ok(())
}

pub fn validate_new_credit_note(note: &NewCreditNote) -> ValidationResult<()> {
    validate_id("source_invoice_id", &note.source_invoice_id)?;
    validate_credit_note_items(&note.items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::TransferLine;
    use crate::types::{Direction, PaymentMethod};

    fn item(qty: i64, price: i64, bps: u32) -> NewInvoiceItem {
        NewInvoiceItem {
            product_id: "p-1".to_string(),
            quantity: Quantity::from_units(qty),
            unit_price: Money::from_cents(price),
            discount_bps: bps,
        }
    }

    fn invoice(items: Vec<NewInvoiceItem>, paid: i64, method: Option<PaymentMethod>) -> NewInvoice {
        NewInvoice {
            direction: Direction::Sales,
            counterparty_id: None,
            location_id: "wh-1".to_string(),
            items,
            paid_amount: Money::from_cents(paid),
            payment_method: method,
            notes: None,
            invoice_date: None,
            created_by: None,
        }
    }

    #[test]
    fn test_invoice_item_rules() {
        assert!(validate_invoice_item(&item(1, 0, 0)).is_ok());
        assert!(validate_invoice_item(&item(0, 100, 0)).is_err());
        assert!(validate_invoice_item(&item(1, -1, 0)).is_err());
        assert!(validate_invoice_item(&item(1, 100, 10_001)).is_err());
    }

    #[test]
    fn test_invoice_requires_items_and_method_when_paid() {
        assert!(validate_new_invoice(&invoice(vec![], 0, None)).is_err());
        assert!(validate_new_invoice(&invoice(vec![item(1, 100, 0)], 0, None)).is_ok());
        assert_eq!(
            validate_new_invoice(&invoice(vec![item(1, 100, 0)], 50, None)),
            Err(ValidationError::Required {
                field: "payment_method".to_string()
            })
        );
        assert!(
            validate_new_invoice(&invoice(vec![item(1, 100, 0)], 50, Some(PaymentMethod::Cash)))
                .is_ok()
        );
    }

    #[test]
    fn test_transfer_rejects_same_location() {
        let transfer = NewTransfer {
            from_location_id: "wh-1".to_string(),
            to_location_id: "wh-1".to_string(),
            items: vec![TransferLine {
                product_id: "p".to_string(),
                quantity: Quantity::from_units(1),
            }],
            notes: None,
            created_by: None,
        };
        assert!(matches!(
            validate_transfer(&transfer),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_payment_amount_positive() {
        assert!(validate_payment_amount(Money::from_cents(1)).is_ok());
        assert!(validate_payment_amount(Money::zero()).is_err());
        assert!(validate_payment_amount(Money::from_cents(-5)).is_err());
    }
}
