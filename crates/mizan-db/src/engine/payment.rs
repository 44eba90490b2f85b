//! # Payment Engine
//!
//! Single payments against one invoice and FIFO allocation of one payment
//! across a counterparty's open invoices.
//!
//! ## FIFO Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  customer C pays 250                                                   │
//! │                                                                         │
//! │  open invoices (oldest first)     due      allocated   status after   │
//! │  ─────────────────────────────    ───      ─────────   ────────────   │
//! │  SI-202610-00001                  100        100        paid          │
//! │  SI-202610-00002                  200        150        partial       │
//! │  SI-202610-00003                  150          0        (untouched)   │
//! │                                                                         │
//! │  payment row:  invoice_id = SI-..01, allocated 250, unallocated 0     │
//! │  allocation rows: one per touched invoice                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The plan itself is computed by [`mizan_core::allocation::plan_fifo`];
//! this module reads the open invoices, nets their credits and writes the
//! plan out in one transaction.

use std::collections::HashMap;

use chrono::Utc;
use tracing::info;

use mizan_core::allocation::{plan_fifo, OpenInvoice};
use mizan_core::settlement::remaining_balance;
use mizan_core::validation::{validate_fifo_payment, validate_payment};
use mizan_core::{
    new_id, AllocationSummary, AllocationType, CoreError, Direction, FifoAllocation, FifoPayment,
    Money, NewPayment, Payment, PaymentAllocation,
};

use crate::engine::invoice::{net_total, save_settlement};
use crate::engine::retry_once;
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::{InvoiceRepository, PaymentRepository};

#[derive(Debug, Clone)]
pub struct PaymentEngine {
    db: Database,
}

impl PaymentEngine {
    pub(crate) fn new(db: Database) -> Self {
        PaymentEngine { db }
    }

    /// Records a payment against one invoice.
    ///
    /// ## Errors
    /// * `Overpayment` - amount exceeds the net balance still owed
    /// * `NotFound` - unknown or deleted invoice
    pub async fn create_single(&self, input: NewPayment) -> DbResult<Payment> {
        validate_payment(&input)?;
        retry_once("create_payment", || self.create_single_once(&input)).await
    }

    async fn create_single_once(&self, input: &NewPayment) -> DbResult<Payment> {
        let tenant_id = self.db.tenant_id();
        let mut tx = self.db.begin_immediate().await?;

        let mut invoice = InvoiceRepository::new(tenant_id)
            .require(&mut tx, &input.invoice_id)
            .await?;
        let net = net_total(&mut tx, tenant_id, &invoice).await?;
        let remaining = remaining_balance(net, invoice.paid_amount);

        if input.amount > remaining {
            return Err(CoreError::Overpayment {
                invoice_id: invoice.id.clone(),
                remaining,
                requested: input.amount,
            }
            .into());
        }

        let payment = Payment {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            invoice_id: Some(invoice.id.clone()),
            direction: invoice.direction,
            counterparty_id: invoice.counterparty_id.clone(),
            amount: input.amount,
            method: input.method,
            reference_number: input.reference_number.clone(),
            notes: input.notes.clone(),
            allocation_type: AllocationType::Single,
            total_allocated: input.amount,
            unallocated_amount: Money::zero(),
            created_by: input.created_by.clone(),
            created_at: Utc::now(),
        };
        PaymentRepository::new(tenant_id)
            .insert(&mut tx, &payment)
            .await?;

        invoice.paid_amount += input.amount;
        save_settlement(&mut tx, tenant_id, &mut invoice, net).await?;

        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            invoice_id = %invoice.id,
            amount = %payment.amount,
            status = invoice.payment_status.as_str(),
            "Payment recorded"
        );
        Ok(payment)
    }

    /// Spreads one payment over the counterparty's open invoices, oldest
    /// first. Whatever exceeds the total due stays on the payment as
    /// `unallocated_amount`.
    ///
    /// ## Errors
    /// * `NoOpenInvoices` - nothing to allocate against
    pub async fn allocate_fifo(&self, input: FifoPayment) -> DbResult<FifoAllocation> {
        validate_fifo_payment(&input)?;
        retry_once("allocate_fifo", || self.allocate_fifo_once(&input)).await
    }

    async fn allocate_fifo_once(&self, input: &FifoPayment) -> DbResult<FifoAllocation> {
        let tenant_id = self.db.tenant_id();
        let mut tx = self.db.begin_immediate().await?;

        let invoices = InvoiceRepository::new(tenant_id)
            .open_for_counterparty(&mut tx, &input.counterparty_id, input.direction)
            .await?;

        let mut open = Vec::with_capacity(invoices.len());
        let mut by_id = HashMap::with_capacity(invoices.len());
        for invoice in invoices {
            let net = net_total(&mut tx, tenant_id, &invoice).await?;
            open.push(OpenInvoice {
                invoice_id: invoice.id.clone(),
                created_at: invoice.created_at,
                net_total: net,
                paid: invoice.paid_amount,
            });
            by_id.insert(invoice.id.clone(), (invoice, net));
        }

        let plan = plan_fifo(input.amount, &open);
        let Some(primary) = plan.primary_invoice_id() else {
            return Err(CoreError::NoOpenInvoices {
                counterparty_id: input.counterparty_id.clone(),
            }
            .into());
        };

        let now = Utc::now();
        let payment = Payment {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            invoice_id: Some(primary.to_string()),
            direction: input.direction,
            counterparty_id: Some(input.counterparty_id.clone()),
            amount: input.amount,
            method: input.method,
            reference_number: input.reference_number.clone(),
            notes: input.notes.clone(),
            allocation_type: AllocationType::Multiple,
            total_allocated: plan.total_allocated,
            unallocated_amount: plan.unallocated,
            created_by: input.created_by.clone(),
            created_at: now,
        };

        let payments = PaymentRepository::new(tenant_id);
        payments.insert(&mut tx, &payment).await?;

        let mut allocations = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let Some((invoice, net)) = by_id.get_mut(&line.invoice_id) else {
                return Err(DbError::Internal(format!(
                    "planned invoice {} was not loaded",
                    line.invoice_id
                )));
            };

            invoice.paid_amount = line.paid_after;
            save_settlement(&mut tx, tenant_id, invoice, *net).await?;

            let allocation = PaymentAllocation {
                id: new_id(),
                tenant_id: tenant_id.to_string(),
                payment_id: payment.id.clone(),
                invoice_id: invoice.id.clone(),
                direction: input.direction,
                allocated_amount: line.amount,
                invoice_status_after: invoice.payment_status,
                allocation_date: input.allocation_date.unwrap_or(now),
                created_at: now,
            };
            payments.insert_allocation(&mut tx, &allocation).await?;
            allocations.push(allocation);
        }

        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            counterparty_id = %input.counterparty_id,
            amount = %payment.amount,
            allocated = %payment.total_allocated,
            unallocated = %payment.unallocated_amount,
            invoices = allocations.len(),
            "FIFO payment allocated"
        );

        Ok(FifoAllocation {
            payment,
            allocations,
        })
    }

    pub async fn get_payment(&self, id: &str) -> DbResult<Payment> {
        let mut conn = self.db.pool().acquire().await?;
        PaymentRepository::new(self.db.tenant_id())
            .get(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", id))
    }

    /// Payments that touched an invoice, single or FIFO.
    pub async fn list_payments(&self, invoice_id: &str) -> DbResult<Vec<Payment>> {
        let mut conn = self.db.pool().acquire().await?;
        PaymentRepository::new(self.db.tenant_id())
            .list_for_invoice(&mut conn, invoice_id)
            .await
    }

    pub async fn payment_allocations(&self, payment_id: &str) -> DbResult<Vec<PaymentAllocation>> {
        let mut conn = self.db.pool().acquire().await?;
        PaymentRepository::new(self.db.tenant_id())
            .allocations_for_payment(&mut conn, payment_id)
            .await
    }

    pub async fn invoice_allocations(&self, invoice_id: &str) -> DbResult<Vec<PaymentAllocation>> {
        let mut conn = self.db.pool().acquire().await?;
        PaymentRepository::new(self.db.tenant_id())
            .allocations_for_invoice(&mut conn, invoice_id)
            .await
    }

    pub async fn allocation_summary(
        &self,
        counterparty_id: &str,
        direction: Direction,
    ) -> DbResult<AllocationSummary> {
        let mut conn = self.db.pool().acquire().await?;
        PaymentRepository::new(self.db.tenant_id())
            .summary(&mut conn, counterparty_id, direction)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use mizan_core::{InvoiceDetail, PaymentMethod, PaymentStatus};

    fn fifo(counterparty: &str, direction: Direction, amount: Money) -> FifoPayment {
        FifoPayment {
            counterparty_id: counterparty.to_string(),
            direction,
            amount,
            method: PaymentMethod::BankTransfer,
            allocation_date: None,
            reference_number: Some("TRX-1".to_string()),
            notes: None,
            created_by: Some("cashier".to_string()),
        }
    }

    fn single(invoice_id: &str, amount: Money) -> NewPayment {
        NewPayment {
            invoice_id: invoice_id.to_string(),
            amount,
            method: PaymentMethod::Cash,
            reference_number: None,
            notes: None,
            created_by: None,
        }
    }

    async fn sell(db: &Database, qty: i64) -> InvoiceDetail {
        db.invoices()
            .create(new_invoice(
                Direction::Sales,
                CUSTOMER,
                WAREHOUSE,
                vec![item(PRODUCT_A, qty, 5)],
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fifo_pays_oldest_first() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, WAREHOUSE, 100).await;
        let first = sell(&db, 20).await; // 100
        let second = sell(&db, 40).await; // 200
        let third = sell(&db, 30).await; // 150

        let result = db
            .payments()
            .allocate_fifo(fifo(CUSTOMER, Direction::Sales, dollars(250)))
            .await
            .unwrap();

        assert_eq!(result.payment.allocation_type, AllocationType::Multiple);
        assert_eq!(result.payment.invoice_id.as_deref(), Some(first.invoice.id.as_str()));
        assert_eq!(result.payment.total_allocated, dollars(250));
        assert!(result.payment.unallocated_amount.is_zero());

        assert_eq!(result.allocations.len(), 2);
        assert_eq!(result.allocations[0].invoice_id, first.invoice.id);
        assert_eq!(result.allocations[0].allocated_amount, dollars(100));
        assert_eq!(result.allocations[0].invoice_status_after, PaymentStatus::Paid);
        assert_eq!(result.allocations[1].invoice_id, second.invoice.id);
        assert_eq!(result.allocations[1].allocated_amount, dollars(150));
        assert_eq!(result.allocations[1].invoice_status_after, PaymentStatus::Partial);

        let invoices = db.invoices();
        assert_eq!(invoices.get(&first.invoice.id).await.unwrap().invoice.payment_status, PaymentStatus::Paid);
        let second_after = invoices.get(&second.invoice.id).await.unwrap().invoice;
        assert_eq!(second_after.paid_amount, dollars(150));
        assert_eq!(second_after.payment_status, PaymentStatus::Partial);
        let third_after = invoices.get(&third.invoice.id).await.unwrap().invoice;
        assert!(third_after.paid_amount.is_zero());
        assert_eq!(third_after.version, third.invoice.version);

        let stored = db.payments().payment_allocations(&result.payment.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(db.payments().invoice_allocations(&second.invoice.id).await.unwrap().len(), 1);
        assert_eq!(db.payments().list_payments(&second.invoice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fifo_leaves_last_invoice_partial() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, WAREHOUSE, 100).await;
        let invoices = vec![sell(&db, 10).await, sell(&db, 10).await, sell(&db, 10).await];

        let result = db
            .payments()
            .allocate_fifo(fifo(CUSTOMER, Direction::Sales, dollars(120)))
            .await
            .unwrap();

        let amounts: Vec<Money> = result.allocations.iter().map(|a| a.allocated_amount).collect();
        assert_eq!(amounts, vec![dollars(50), dollars(50), dollars(20)]);

        let statuses: Vec<PaymentStatus> = result
            .allocations
            .iter()
            .map(|a| a.invoice_status_after)
            .collect();
        assert_eq!(
            statuses,
            vec![PaymentStatus::Paid, PaymentStatus::Paid, PaymentStatus::Partial]
        );

        let last = db.invoices().get(&invoices[2].invoice.id).await.unwrap().invoice;
        assert_eq!(last.paid_amount, dollars(20));
        assert_eq!(last.payment_status, PaymentStatus::Partial);

        let allocated: Money = result.allocations.iter().map(|a| a.allocated_amount).sum();
        assert_eq!(allocated + result.payment.unallocated_amount, result.payment.amount);
    }

    #[tokio::test]
    async fn test_fifo_surplus_stays_unallocated() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, WAREHOUSE, 100).await;
        sell(&db, 20).await; // 100

        let result = db
            .payments()
            .allocate_fifo(fifo(CUSTOMER, Direction::Sales, dollars(130)))
            .await
            .unwrap();
        assert_eq!(result.payment.total_allocated, dollars(100));
        assert_eq!(result.payment.unallocated_amount, dollars(30));
        assert_eq!(
            result.payment.total_allocated + result.payment.unallocated_amount,
            result.payment.amount
        );

        let summary = db
            .payments()
            .allocation_summary(CUSTOMER, Direction::Sales)
            .await
            .unwrap();
        assert_eq!(summary.payment_count, 1);
        assert_eq!(summary.total_paid, dollars(130));
        assert_eq!(summary.total_unallocated, dollars(30));

        // Everything is paid now.
        let err = db
            .payments()
            .allocate_fifo(fifo(CUSTOMER, Direction::Sales, dollars(10)))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::NoOpenInvoices { .. })));
    }

    #[tokio::test]
    async fn test_fifo_without_open_invoices() {
        let db = ledger().await;
        let err = db
            .payments()
            .allocate_fifo(fifo("cust-unknown", Direction::Sales, dollars(10)))
            .await
            .unwrap_err();
        assert_eq!(
            err.as_core(),
            Some(&CoreError::NoOpenInvoices {
                counterparty_id: "cust-unknown".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_fifo_purchase_direction_is_separate() {
        let db = ledger().await;
        let first = stock_up(&db, PRODUCT_A, STORE, 5).await; // owe vendor 5
        let second = stock_up(&db, PRODUCT_B, STORE, 5).await; // owe vendor 5

        // Sales side for the vendor id has nothing open.
        assert!(db
            .payments()
            .allocate_fifo(fifo(VENDOR, Direction::Sales, dollars(7)))
            .await
            .is_err());

        let result = db
            .payments()
            .allocate_fifo(fifo(VENDOR, Direction::Purchase, dollars(7)))
            .await
            .unwrap();
        assert_eq!(result.allocations[0].invoice_id, first.invoice.id);
        assert_eq!(result.allocations[1].invoice_id, second.invoice.id);
        assert_eq!(result.allocations[1].allocated_amount, dollars(2));
    }

    #[tokio::test]
    async fn test_single_payment_overpayment_rejected() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, WAREHOUSE, 100).await;
        let invoice = db
            .invoices()
            .create(paid_with(
                new_invoice(Direction::Sales, CUSTOMER, WAREHOUSE, vec![item(PRODUCT_A, 18, 5)]),
                dollars(50),
            ))
            .await
            .unwrap()
            .invoice;

        let err = db
            .payments()
            .create_single(single(&invoice.id, dollars(41)))
            .await
            .unwrap_err();
        assert_eq!(
            err.as_core(),
            Some(&CoreError::Overpayment {
                invoice_id: invoice.id.clone(),
                remaining: dollars(40),
                requested: dollars(41),
            })
        );

        let payment = db
            .payments()
            .create_single(single(&invoice.id, dollars(40)))
            .await
            .unwrap();
        assert_eq!(db.payments().get_payment(&payment.id).await.unwrap().amount, dollars(40));

        let after = db.invoices().get(&invoice.id).await.unwrap().invoice;
        assert_eq!(after.paid_amount, dollars(90));
        assert_eq!(after.payment_status, PaymentStatus::Paid);
        assert_eq!(db.payments().list_payments(&invoice.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_payment_rejected() {
        let db = ledger().await;
        let result = db.payments().create_single(single("any", Money::zero())).await;
        assert!(matches!(result, Err(DbError::Core(CoreError::Validation(_)))));
    }

    #[tokio::test]
    async fn test_allocated_invoice_cannot_be_deleted() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, WAREHOUSE, 100).await;
        let invoice = sell(&db, 20).await;
        db.payments()
            .allocate_fifo(fifo(CUSTOMER, Direction::Sales, dollars(30)))
            .await
            .unwrap();

        let err = db.invoices().delete(&invoice.invoice.id, None).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InvalidStateTransition { status, .. }) if status == "allocated"
        ));
    }
}
