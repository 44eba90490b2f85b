//! # Request Types
//!
//! Inputs accepted by the engines. Request handlers deserialize these
//! straight from their payloads; the engines validate them before opening a
//! transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{Direction, LocationType, MovementType, PaymentMethod, PaymentStatus};

// =============================================================================
// Stock
// =============================================================================

/// Append-only movement record as written by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMovement {
    pub product_id: String,
    pub movement_type: MovementType,
    pub quantity: Quantity,
    pub from_location_type: Option<LocationType>,
    pub from_location_id: Option<String>,
    pub to_location_type: Option<LocationType>,
    pub to_location_id: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

/// Filter for the movement history query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementFilter {
    pub product_id: Option<String>,
    pub movement_type: Option<MovementType>,
    /// Matches either endpoint.
    pub location_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub from: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub to: Option<DateTime<Utc>>,
    /// Falls back to the configured default when `None`.
    pub limit: Option<u32>,
}

// =============================================================================
// Transfer
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferLine {
    pub product_id: String,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewTransfer {
    pub from_location_id: String,
    pub to_location_id: String,
    pub items: Vec<TransferLine>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

// =============================================================================
// Invoice
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewInvoiceItem {
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    #[serde(default)]
    pub discount_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewInvoice {
    pub direction: Direction,
    pub counterparty_id: Option<String>,
    pub location_id: String,
    pub items: Vec<NewInvoiceItem>,
    #[serde(default)]
    pub paid_amount: Money,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    /// Defaults to today (UTC).
    #[ts(as = "Option<String>")]
    pub invoice_date: Option<NaiveDate>,
    pub created_by: Option<String>,
}

/// Replacement values for an existing invoice line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateInvoiceItem {
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    #[serde(default)]
    pub discount_bps: u32,
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceFilter {
    pub direction: Option<Direction>,
    pub counterparty_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub location_id: Option<String>,
    pub limit: Option<u32>,
}

// =============================================================================
// Payment
// =============================================================================

/// A payment against exactly one invoice.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPayment {
    pub invoice_id: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

/// A payment spread oldest-first across a counterparty's open invoices.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FifoPayment {
    pub counterparty_id: String,
    pub direction: Direction,
    pub amount: Money,
    pub method: PaymentMethod,
    /// Defaults to now.
    #[ts(as = "Option<String>")]
    pub allocation_date: Option<DateTime<Utc>>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

// =============================================================================
// Credit Note
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCreditNoteItem {
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCreditNote {
    pub source_invoice_id: String,
    /// Defaults to the source invoice's location.
    pub location_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub credit_note_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Vec<NewCreditNoteItem>,
    pub created_by: Option<String>,
}
