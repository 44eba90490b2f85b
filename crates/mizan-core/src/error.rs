//! # Error Types
//!
//! Domain error types for mizan-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mizan-core errors (this file)                                         │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Malformed input                                │
//! │                                                                         │
//! │  mizan-db errors (separate crate)                                      │
//! │  └── DbError          - NotFound, ConsistencyViolation, SQL failures   │
//! │                          (wraps CoreError transparently)               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → request handler         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant here is detected before any durable write of the current
//! operation, so returning it never leaves partial effects behind.

use thiserror::Error;

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Not enough stock at a location to cover a debit.
    ///
    /// ## When This Occurs
    /// - Selling more than the invoice location holds
    /// - Transferring more than the source location holds
    /// - Deleting a purchase invoice whose goods were already resold
    /// - Approving a purchase return after the goods left the location
    ///
    /// ```text
    /// stock(P, warehouse W1) = 0
    ///      │
    ///      ▼
    /// sell 1 × P at W1
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: P, available: 0, required: 1 }
    /// ```
    #[error("Insufficient stock for product {product_id}: available {available}, required {required}")]
    InsufficientStock {
        product_id: String,
        available: Quantity,
        required: Quantity,
    },

    /// Payment amount exceeds what is still owed on the invoice.
    #[error("Payment of {requested} exceeds remaining balance {remaining} on invoice {invoice_id}")]
    Overpayment {
        invoice_id: String,
        remaining: Money,
        requested: Money,
    },

    /// A credit note would return more than was ever invoiced.
    #[error(
        "Credit for product {product_id} exceeds invoiced quantity: invoiced {invoiced}, already credited {already_credited}, requested {requested}"
    )]
    ExceedsInvoiceQuantity {
        product_id: String,
        invoiced: Quantity,
        already_credited: Quantity,
        requested: Quantity,
    },

    /// The entity's current status does not allow the operation.
    ///
    /// ## When This Occurs
    /// - Approving, editing or cancelling a non-draft credit note
    /// - Deleting an approved credit note
    /// - Deleting an invoice that still has FIFO allocations or approved
    ///   credit notes attached
    #[error("{entity} {id} is {status}, cannot {action}")]
    InvalidStateTransition {
        entity: String,
        id: String,
        status: String,
        action: String,
    },

    /// FIFO allocation found nothing to pay.
    #[error("No unpaid invoices found for counterparty {counterparty_id}")]
    NoOpenInvoices { counterparty_id: String },

    /// Input validation failure.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Shorthand for [`CoreError::InvalidStateTransition`].
    pub fn invalid_transition(
        entity: impl Into<String>,
        id: impl Into<String>,
        status: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        CoreError::InvalidStateTransition {
            entity: entity.into(),
            id: id.into(),
            status: status.into(),
            action: action.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;
