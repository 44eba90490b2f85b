//! # Domain Types
//!
//! Records persisted by the ledger and the enums that classify them.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  STOCK HALF                         SETTLEMENT HALF                     │
//! │  ┌─────────────────┐                ┌─────────────────┐                 │
//! │  │   StockLevel    │                │    Invoice      │ Direction       │
//! │  │ (product, type, │◄── movements ──│  + InvoiceItem  │ Sales/Purchase  │
//! │  │  location) → qty│                └────────┬────────┘                 │
//! │  └────────▲────────┘                         │ paid / status            │
//! │           │                         ┌────────┴────────┐                 │
//! │  ┌────────┴────────┐                │    Payment      │                 │
//! │  │ StockMovement   │                │ + Allocation    │                 │
//! │  │ (append-only)   │                └─────────────────┘                 │
//! │  └────────▲────────┘                ┌─────────────────┐                 │
//! │           └────── approval ─────────│   CreditNote    │                 │
//! │  ┌─────────────────┐                │ + CreditNoteItem│                 │
//! │  │    Transfer     │                └─────────────────┘                 │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every record has a UUID v7 `id` (time-ordered) and, for documents, a
//! human-readable number such as `SI-202610-00001`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Location Type
// =============================================================================

/// The class of place that holds stock.
///
/// Stock rows are keyed by `(product, location_type, location_id)`. The
/// type always comes from the location master record, never from the
/// caller, so a van's stock cannot be booked against a warehouse key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Warehouse,
    Store,
    Van,
    InTransit,
}

impl LocationType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LocationType::Warehouse => "warehouse",
            LocationType::Store => "store",
            LocationType::Van => "van",
            LocationType::InTransit => "in_transit",
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Direction
// =============================================================================

/// Which side of the business an invoice sits on.
///
/// Sales and purchase invoices share one engine; the direction only decides
/// which way stock moves and who the counterparty is.
///
/// ```text
///              stock on invoice   credit-note return   counterparty
///   Sales      debit  (-qty)      credit (+qty)        customer
///   Purchase   credit (+qty)      debit  (-qty)        vendor
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sales,
    Purchase,
}

impl Direction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Sales => "sales",
            Direction::Purchase => "purchase",
        }
    }

    /// Signed stock effect of invoicing `quantity`.
    pub fn invoice_stock_delta(&self, quantity: Quantity) -> Quantity {
        match self {
            Direction::Sales => -quantity,
            Direction::Purchase => quantity,
        }
    }

    /// Signed stock effect of approving a credit note for `quantity`.
    pub fn credit_note_stock_delta(&self, quantity: Quantity) -> Quantity {
        -self.invoice_stock_delta(quantity)
    }

    /// Movement type written when an invoice line moves stock.
    pub const fn movement_type(&self) -> MovementType {
        match self {
            Direction::Sales => MovementType::Sale,
            Direction::Purchase => MovementType::Purchase,
        }
    }

    /// Movement type written when an invoice deletion reverses stock.
    pub const fn delete_movement_type(&self) -> MovementType {
        match self {
            Direction::Sales => MovementType::SalesDelete,
            Direction::Purchase => MovementType::PurchaseDelete,
        }
    }

    pub const fn document_kind(&self) -> DocumentKind {
        match self {
            Direction::Sales => DocumentKind::SalesInvoice,
            Direction::Purchase => DocumentKind::PurchaseInvoice,
        }
    }

    /// "customer" or "vendor", for messages.
    pub const fn counterparty_label(&self) -> &'static str {
        match self {
            Direction::Sales => "customer",
            Direction::Purchase => "vendor",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Movement Type
// =============================================================================

/// Cause of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    Sale,
    Transfer,
    Adjustment,
    CreditNoteReturn,
    PurchaseDelete,
    SalesDelete,
}

impl MovementType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::Purchase => "purchase",
            MovementType::Sale => "sale",
            MovementType::Transfer => "transfer",
            MovementType::Adjustment => "adjustment",
            MovementType::CreditNoteReturn => "credit_note_return",
            MovementType::PurchaseDelete => "purchase_delete",
            MovementType::SalesDelete => "sales_delete",
        }
    }
}

// =============================================================================
// Payment Status / Method / Allocation Type
// =============================================================================

/// Settlement state of an invoice. Always derived, never set directly;
/// see [`crate::settlement::payment_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }

    /// Whether FIFO allocation may still pick this invoice up.
    pub const fn is_open(&self) -> bool {
        !matches!(self, PaymentStatus::Paid)
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unpaid
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Cheque,
}

/// How a payment was applied.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AllocationType {
    /// Paid against exactly one invoice.
    Single,
    /// FIFO across a counterparty's open invoices.
    Multiple,
}

// =============================================================================
// Credit Note Status
// =============================================================================

/// Credit-note lifecycle.
///
/// ```text
///            approve
///   draft ───────────► approved   (terminal, stock moved)
///     │
///     │ cancel
///     ▼
///   cancelled                      (terminal, no stock effect)
/// ```
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CreditNoteStatus {
    Draft,
    Approved,
    Cancelled,
}

impl CreditNoteStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CreditNoteStatus::Draft => "draft",
            CreditNoteStatus::Approved => "approved",
            CreditNoteStatus::Cancelled => "cancelled",
        }
    }

    pub const fn can_edit(&self) -> bool {
        matches!(self, CreditNoteStatus::Draft)
    }

    pub const fn can_approve(&self) -> bool {
        matches!(self, CreditNoteStatus::Draft)
    }

    pub const fn can_cancel(&self) -> bool {
        matches!(self, CreditNoteStatus::Draft)
    }

    pub const fn can_delete(&self) -> bool {
        !matches!(self, CreditNoteStatus::Approved)
    }
}

impl Default for CreditNoteStatus {
    fn default() -> Self {
        CreditNoteStatus::Draft
    }
}

// =============================================================================
// Document Kind
// =============================================================================

/// Numbered document series. Each kind has its own per-tenant counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    SalesInvoice,
    PurchaseInvoice,
    CreditNote,
}

impl DocumentKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::SalesInvoice => "sales_invoice",
            DocumentKind::PurchaseInvoice => "purchase_invoice",
            DocumentKind::CreditNote => "credit_note",
        }
    }
}

// =============================================================================
// Master Data
// =============================================================================

/// A place that can hold stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Location {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub location_type: LocationType,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A stocked product. Only the fields the ledger needs.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub sku: String,
    pub name: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock
// =============================================================================

/// Fully resolved stock key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockKey {
    pub product_id: String,
    pub location_type: LocationType,
    pub location_id: String,
}

/// Quantity on hand for one product at one location.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLevel {
    pub id: String,
    pub tenant_id: String,
    pub product_id: String,
    pub location_type: LocationType,
    pub location_id: String,
    pub quantity: Quantity,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Immutable audit record of a stock change.
///
/// `quantity` is signed by the convention of `movement_type`: outbound
/// sales are negative, purchase deletions are negative, transfers carry the
/// moved (positive) amount with both endpoints filled in.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub tenant_id: String,
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
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Total on hand for a product across all locations.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductStockSummary {
    pub product_id: String,
    pub total_quantity: Quantity,
    pub location_count: i64,
}

// =============================================================================
// Transfer
// =============================================================================

/// A completed movement of goods between two locations.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transfer {
    pub id: String,
    pub tenant_id: String,
    pub from_location_type: LocationType,
    pub from_location_id: String,
    pub to_location_type: LocationType,
    pub to_location_id: String,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransferItem {
    pub id: String,
    pub transfer_id: String,
    pub product_id: String,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferDetail {
    pub transfer: Transfer,
    pub items: Vec<TransferItem>,
}

// =============================================================================
// Invoice
// =============================================================================

/// A sales or purchase invoice.
///
/// `total_amount` is the gross sum of the items. Approved credit notes are
/// tracked on their own documents; the net figure used for settlement is
/// [`crate::settlement::settlement_total`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub tenant_id: String,
    pub direction: Direction,
    pub invoice_number: String,
    /// Customer (sales) or vendor (purchase).
    pub counterparty_id: Option<String>,
    pub location_id: String,
    pub location_type: LocationType,
    pub total_amount: Money,
    /// Raw paid figure, never clamped to the total.
    pub paid_amount: Money,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub invoice_date: NaiveDate,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,
}

/// One line of an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InvoiceItem {
    pub id: String,
    pub invoice_id: String,
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    /// 1000 = 10 %.
    pub discount_bps: u32,
    pub total: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

// =============================================================================
// Payment
// =============================================================================

/// Money received from a customer or paid to a vendor.
///
/// Immutable once written; the allocation totals are computed before the
/// row is inserted.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub tenant_id: String,
    /// The invoice paid (single) or the first invoice allocated to (FIFO).
    pub invoice_id: Option<String>,
    pub direction: Direction,
    pub counterparty_id: Option<String>,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub allocation_type: AllocationType,
    pub total_allocated: Money,
    pub unallocated_amount: Money,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// One invoice's share of a FIFO payment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentAllocation {
    pub id: String,
    pub tenant_id: String,
    pub payment_id: String,
    pub invoice_id: String,
    pub direction: Direction,
    pub allocated_amount: Money,
    pub invoice_status_after: PaymentStatus,
    #[ts(as = "String")]
    pub allocation_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Aggregate of a counterparty's payments in one direction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AllocationSummary {
    pub payment_count: i64,
    pub total_paid: Money,
    pub total_allocated: Money,
    pub total_unallocated: Money,
}

/// A FIFO payment together with the allocation rows it produced.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FifoAllocation {
    pub payment: Payment,
    pub allocations: Vec<PaymentAllocation>,
}

// =============================================================================
// Credit Note
// =============================================================================

/// A document partially reversing an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CreditNote {
    pub id: String,
    pub tenant_id: String,
    pub credit_note_number: String,
    pub source_invoice_id: String,
    /// Copied from the source invoice.
    pub direction: Direction,
    pub counterparty_id: Option<String>,
    pub location_id: String,
    pub location_type: LocationType,
    #[ts(as = "String")]
    pub credit_note_date: NaiveDate,
    pub total_amount: Money,
    pub status: CreditNoteStatus,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub approved_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CreditNoteItem {
    pub id: String,
    pub credit_note_id: String,
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub total: Money,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreditNoteDetail {
    pub credit_note: CreditNote,
    pub items: Vec<CreditNoteItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_stock_signs() {
        let q = Quantity::from_units(3);
        assert_eq!(Direction::Sales.invoice_stock_delta(q), -q);
        assert_eq!(Direction::Purchase.invoice_stock_delta(q), q);
        assert_eq!(Direction::Purchase.credit_note_stock_delta(q), -q);
        assert_eq!(Direction::Sales.credit_note_stock_delta(q), q);
    }

    #[test]
    fn test_direction_movement_types() {
        assert_eq!(Direction::Sales.movement_type(), MovementType::Sale);
        assert_eq!(Direction::Purchase.delete_movement_type(), MovementType::PurchaseDelete);
        assert_eq!(Direction::Sales.document_kind(), DocumentKind::SalesInvoice);
    }

    #[test]
    fn test_credit_note_lifecycle_rules() {
        assert!(CreditNoteStatus::Draft.can_approve());
        assert!(CreditNoteStatus::Draft.can_cancel());
        assert!(!CreditNoteStatus::Approved.can_cancel());
        assert!(!CreditNoteStatus::Approved.can_delete());
        assert!(CreditNoteStatus::Cancelled.can_delete());
        assert!(!CreditNoteStatus::Cancelled.can_approve());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&LocationType::InTransit).unwrap(),
            "\"in_transit\""
        );
        assert_eq!(
            serde_json::to_string(&MovementType::CreditNoteReturn).unwrap(),
            "\"credit_note_return\""
        );
    }
}
