//! # FIFO Allocation Planner
//!
//! Splits one payment across a counterparty's open invoices, oldest first.
//!
//! ```text
//! payment $120
//!      │
//!      ▼
//! ┌──────────────┬──────────────┬──────────────┐
//! │ INV-1  $50   │ INV-2  $50   │ INV-3  $50   │   (created_at, id) ASC
//! │ due $50      │ due $50      │ due $50      │
//! │ alloc $50    │ alloc $50    │ alloc $20    │
//! │ → paid       │ → paid       │ → partial    │
//! └──────────────┴──────────────┴──────────────┘
//!      remaining $0 → unallocated $0
//! ```
//!
//! The planner is pure: the database crate loads the open invoices, calls
//! [`plan_fifo`], and writes exactly what the plan says. Identical inputs
//! produce identical plans regardless of the order the rows were loaded in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::settlement::{payment_status, remaining_balance};
use crate::types::PaymentStatus;

/// An invoice eligible for FIFO allocation, as seen at planning time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInvoice {
    pub invoice_id: String,
    pub created_at: DateTime<Utc>,
    /// Gross total less approved credit notes.
    pub net_total: Money,
    pub paid: Money,
}

/// One invoice's share of the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAllocation {
    pub invoice_id: String,
    pub amount: Money,
    pub paid_after: Money,
    pub status_after: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub lines: Vec<PlannedAllocation>,
    pub total_allocated: Money,
    /// Never silently dropped; recorded on the payment.
    pub unallocated: Money,
}

impl AllocationPlan {
    /// Invoice the payment row points at: the first one that received money.
    pub fn primary_invoice_id(&self) -> Option<&str> {
        self.lines.first().map(|line| line.invoice_id.as_str())
    }
}

/// Plans a FIFO allocation of `amount` over `invoices`.
///
/// ## Rules
/// 1. Invoices are ordered by `(created_at, invoice_id)` ascending.
/// 2. `due = net_total − paid`; invoices with `due <= 0` are skipped.
/// 3. Each invoice receives `min(remaining, due)`.
/// 4. Stops when the payment is exhausted or invoices run out.
///
/// `Σ lines.amount + unallocated == amount` always holds.
pub fn plan_fifo(amount: Money, invoices: &[OpenInvoice]) -> AllocationPlan {
    let mut ordered: Vec<&OpenInvoice> = invoices.iter().collect();
    ordered.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.invoice_id.cmp(&b.invoice_id))
    });

    let mut remaining = amount.non_negative();
    let mut lines = Vec::new();

    for invoice in ordered {
        if !remaining.is_positive() {
            break;
        }

        let due = remaining_balance(invoice.net_total, invoice.paid);
        if !due.is_positive() {
            continue;
        }

        let allocated = remaining.min(due);
        let paid_after = invoice.paid + allocated;
        remaining -= allocated;

        lines.push(PlannedAllocation {
            invoice_id: invoice.invoice_id.clone(),
            amount: allocated,
            paid_after,
            status_after: payment_status(paid_after, invoice.net_total),
        });
    }

    let total_allocated = lines.iter().map(|line| line.amount).sum();

    AllocationPlan {
        lines,
        total_allocated,
        unallocated: remaining,
    }
}
