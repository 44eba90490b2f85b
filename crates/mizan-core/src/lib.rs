//! # mizan-core: Pure Ledger Logic
//!
//! The arithmetic and rules of the stock & settlement ledger, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mizan Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Request handlers (out of tree)                  │   │
//! │  │   create invoice, allocate payment, approve credit note, ...   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              mizan-db (engines + repositories)                  │   │
//! │  │   transactions, conditional stock updates, numbering            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ pure calls                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ mizan-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌──────────┐ ┌────────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │  │  money  │ │settlement│ │ allocation │ │ credit │ │validate│ │   │
//! │  │  │quantity │ │  status  │ │ FIFO plan  │ │  caps  │ │        │ │   │
//! │  │  └─────────┘ └──────────┘ └────────────┘ └────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Persisted records and their enums
//! - [`requests`] - Engine inputs
//! - [`money`] / [`quantity`] - Integer cents and fixed-point stock quantities
//! - [`settlement`] - Line totals, net totals, payment status
//! - [`allocation`] - FIFO payment planning
//! - [`credit`] - Credit-note quantity caps
//! - [`validation`] - Request shape checks
//! - [`error`] - Domain errors
//!
//! ## Example Usage
//!
//! ```rust
//! use mizan_core::money::Money;
//! use mizan_core::quantity::Quantity;
//! use mizan_core::settlement::{line_total, payment_status};
//! use mizan_core::PaymentStatus;
//!
//! let total = line_total(Quantity::from_units(10), Money::from_cents(500), 0)
//!     + line_total(Quantity::from_units(2), Money::from_cents(2000), 0);
//! assert_eq!(total.cents(), 9000);
//! assert_eq!(payment_status(Money::from_cents(5000), total), PaymentStatus::Partial);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod credit;
pub mod error;
pub mod money;
pub mod quantity;
pub mod requests;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use quantity::Quantity;
pub use requests::*;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tenant used when no tenant is configured.
///
/// The schema is multi-tenant; a single-tenant deployment simply never
/// changes this.
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Upper bound on lines per invoice, credit note or transfer.
pub const MAX_DOCUMENT_LINES: usize = 500;

/// 100 % in basis points.
pub const MAX_DISCOUNT_BPS: u32 = 10_000;

/// Generates a new entity id.
///
/// UUID v7 embeds a millisecond timestamp and is monotonic within the
/// process, so ids sort in creation order. FIFO uses this as its tiebreak.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
