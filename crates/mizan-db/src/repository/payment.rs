//! # Payment Repository
//!
//! Payments are immutable once written. Allocation rows exist only for
//! FIFO (`multiple`) payments; a single payment points at its invoice
//! directly.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use mizan_core::{AllocationSummary, Direction, Payment, PaymentAllocation};

#[derive(Debug, Clone, Copy)]
pub struct PaymentRepository<'t> {
    tenant_id: &'t str,
}

impl<'t> PaymentRepository<'t> {
    pub fn new(tenant_id: &'t str) -> Self {
        PaymentRepository { tenant_id }
    }

    pub async fn insert(&self, conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        debug!(
            id = %payment.id,
            amount = %payment.amount,
            allocation_type = ?payment.allocation_type,
            "Inserting payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, tenant_id, invoice_id, direction, counterparty_id, amount, method,
                reference_number, notes, allocation_type, total_allocated,
                unallocated_amount, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&payment.id)
        .bind(self.tenant_id)
        .bind(&payment.invoice_id)
        .bind(payment.direction)
        .bind(&payment.counterparty_id)
        .bind(payment.amount)
        .bind(payment.method)
        .bind(&payment.reference_number)
        .bind(&payment.notes)
        .bind(payment.allocation_type)
        .bind(payment.total_allocated)
        .bind(payment.unallocated_amount)
        .bind(&payment.created_by)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_allocation(
        &self,
        conn: &mut SqliteConnection,
        allocation: &PaymentAllocation,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_allocations (
                id, tenant_id, payment_id, invoice_id, direction, allocated_amount,
                invoice_status_after, allocation_date, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&allocation.id)
        .bind(self.tenant_id)
        .bind(&allocation.payment_id)
        .bind(&allocation.invoice_id)
        .bind(allocation.direction)
        .bind(allocation.allocated_amount)
        .bind(allocation.invoice_status_after)
        .bind(allocation.allocation_date)
        .bind(allocation.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn get(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, tenant_id, invoice_id, direction, counterparty_id, amount, method,
                   reference_number, notes, allocation_type, total_allocated,
                   unallocated_amount, created_by, created_at
            FROM payments
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(id)
        .bind(self.tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(payment)
    }

    /// Payments that touched an invoice: single payments against it and FIFO
    /// payments with an allocation on it.
    pub async fn list_for_invoice(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT p.id, p.tenant_id, p.invoice_id, p.direction, p.counterparty_id, p.amount,
                   p.method, p.reference_number, p.notes, p.allocation_type, p.total_allocated,
                   p.unallocated_amount, p.created_by, p.created_at
            FROM payments p
            WHERE p.tenant_id = ?1
              AND (p.invoice_id = ?2
                   OR EXISTS (SELECT 1 FROM payment_allocations a
                              WHERE a.payment_id = p.id AND a.invoice_id = ?2))
            ORDER BY p.created_at, p.id
            "#,
        )
        .bind(self.tenant_id)
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(payments)
    }

    pub async fn allocations_for_payment(
        &self,
        conn: &mut SqliteConnection,
        payment_id: &str,
    ) -> DbResult<Vec<PaymentAllocation>> {
        let rows = sqlx::query_as::<_, PaymentAllocation>(
            r#"
            SELECT id, tenant_id, payment_id, invoice_id, direction, allocated_amount,
                   invoice_status_after, allocation_date, created_at
            FROM payment_allocations
            WHERE tenant_id = ?1 AND payment_id = ?2
            ORDER BY created_at, id
            "#,
        )
        .bind(self.tenant_id)
        .bind(payment_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    pub async fn allocations_for_invoice(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<Vec<PaymentAllocation>> {
        let rows = sqlx::query_as::<_, PaymentAllocation>(
            r#"
            SELECT id, tenant_id, payment_id, invoice_id, direction, allocated_amount,
                   invoice_status_after, allocation_date, created_at
            FROM payment_allocations
            WHERE tenant_id = ?1 AND invoice_id = ?2
            ORDER BY created_at, id
            "#,
        )
        .bind(self.tenant_id)
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    /// Totals over a counterparty's payments in one direction.
    pub async fn summary(
        &self,
        conn: &mut SqliteConnection,
        counterparty_id: &str,
        direction: Direction,
    ) -> DbResult<AllocationSummary> {
        let summary = sqlx::query_as::<_, AllocationSummary>(
            r#"
            SELECT COUNT(*) AS payment_count,
                   COALESCE(SUM(amount), 0) AS total_paid,
                   COALESCE(SUM(total_allocated), 0) AS total_allocated,
                   COALESCE(SUM(unallocated_amount), 0) AS total_unallocated
            FROM payments
            WHERE tenant_id = ?1 AND counterparty_id = ?2 AND direction = ?3
            "#,
        )
        .bind(self.tenant_id)
        .bind(counterparty_id)
        .bind(direction)
        .fetch_one(&mut *conn)
        .await?;

        Ok(summary)
    }

    /// Number of FIFO allocation rows on an invoice.
    pub async fn count_allocations_for_invoice(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payment_allocations WHERE tenant_id = ?1 AND invoice_id = ?2",
        )
        .bind(self.tenant_id)
        .bind(invoice_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    /// Removes the single payments recorded against an invoice.
    pub async fn delete_single_for_invoice(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM payments
            WHERE tenant_id = ?1 AND invoice_id = ?2 AND allocation_type = 'single'
            "#,
        )
        .bind(self.tenant_id)
        .bind(invoice_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}
