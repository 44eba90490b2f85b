//! # Invoice Repository
//!
//! Sales and purchase invoices share one table and one repository; the
//! `direction` column tells them apart.
//!
//! ## Optimistic Versioning
//! ```text
//! read invoice (version = 7)
//!      │
//!      ▼
//! UPDATE invoices SET .., version = version + 1
//! WHERE id = ? AND version = 7 AND deleted_at IS NULL
//!      │
//!      ├── 1 row  → invoice.version = 8
//!      └── 0 rows → ConsistencyViolation (someone else wrote first)
//! ```

use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use mizan_core::{Direction, Invoice, InvoiceFilter, InvoiceItem, Quantity};

#[derive(Debug, Clone, Copy)]
pub struct InvoiceRepository<'t> {
    tenant_id: &'t str,
}

impl<'t> InvoiceRepository<'t> {
    pub fn new(tenant_id: &'t str) -> Self {
        InvoiceRepository { tenant_id }
    }

    pub async fn insert(&self, conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
        debug!(id = %invoice.id, number = %invoice.invoice_number, "Inserting invoice");

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, tenant_id, direction, invoice_number, counterparty_id,
                location_id, location_type, total_amount, paid_amount, payment_status,
                payment_method, notes, invoice_date, created_by,
                created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
        )
        .bind(&invoice.id)
        .bind(self.tenant_id)
        .bind(invoice.direction)
        .bind(&invoice.invoice_number)
        .bind(&invoice.counterparty_id)
        .bind(&invoice.location_id)
        .bind(invoice.location_type)
        .bind(invoice.total_amount)
        .bind(invoice.paid_amount)
        .bind(invoice.payment_status)
        .bind(invoice.payment_method)
        .bind(&invoice.notes)
        .bind(invoice.invoice_date)
        .bind(&invoice.created_by)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .bind(invoice.deleted_at)
        .bind(invoice.version)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Live (not soft-deleted) invoice by id.
    pub async fn get(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, tenant_id, direction, invoice_number, counterparty_id,
                   location_id, location_type, total_amount, paid_amount, payment_status,
                   payment_method, notes, invoice_date, created_by,
                   created_at, updated_at, deleted_at, version
            FROM invoices
            WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(self.tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(invoice)
    }

    /// Like [`get`](Self::get) but a missing invoice is `NotFound`.
    pub async fn require(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Invoice> {
        self.get(conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", id))
    }

    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        filter: &InvoiceFilter,
    ) -> DbResult<Vec<Invoice>> {
        let limit = filter.limit.map(i64::from).unwrap_or(-1);

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, tenant_id, direction, invoice_number, counterparty_id,
                   location_id, location_type, total_amount, paid_amount, payment_status,
                   payment_method, notes, invoice_date, created_by,
                   created_at, updated_at, deleted_at, version
            FROM invoices
            WHERE tenant_id = ?1 AND deleted_at IS NULL
              AND (?2 IS NULL OR direction = ?2)
              AND (?3 IS NULL OR counterparty_id = ?3)
              AND (?4 IS NULL OR payment_status = ?4)
              AND (?5 IS NULL OR location_id = ?5)
            ORDER BY created_at DESC, id DESC
            LIMIT ?6
            "#,
        )
        .bind(self.tenant_id)
        .bind(filter.direction)
        .bind(filter.counterparty_id.as_deref())
        .bind(filter.payment_status)
        .bind(filter.location_id.as_deref())
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        Ok(invoices)
    }

    /// A counterparty's unpaid and partial invoices, oldest first.
    pub async fn open_for_counterparty(
        &self,
        conn: &mut SqliteConnection,
        counterparty_id: &str,
        direction: Direction,
    ) -> DbResult<Vec<Invoice>> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, tenant_id, direction, invoice_number, counterparty_id,
                   location_id, location_type, total_amount, paid_amount, payment_status,
                   payment_method, notes, invoice_date, created_by,
                   created_at, updated_at, deleted_at, version
            FROM invoices
            WHERE tenant_id = ?1 AND direction = ?2 AND counterparty_id = ?3
              AND payment_status IN ('unpaid', 'partial')
              AND deleted_at IS NULL
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(self.tenant_id)
        .bind(direction)
        .bind(counterparty_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(invoices)
    }

    /// Writes total, paid and status under the version check and bumps the
    /// version on `invoice`.
    pub async fn save_balance(&self, conn: &mut SqliteConnection, invoice: &mut Invoice) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET total_amount = ?1, paid_amount = ?2, payment_status = ?3,
                updated_at = ?4, version = version + 1
            WHERE id = ?5 AND tenant_id = ?6 AND version = ?7 AND deleted_at IS NULL
            "#,
        )
        .bind(invoice.total_amount)
        .bind(invoice.paid_amount)
        .bind(invoice.payment_status)
        .bind(now)
        .bind(&invoice.id)
        .bind(self.tenant_id)
        .bind(invoice.version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::ConsistencyViolation(format!(
                "invoice {} changed since version {}",
                invoice.id, invoice.version
            )));
        }

        invoice.version += 1;
        invoice.updated_at = now;
        Ok(())
    }

    /// Marks the invoice deleted under the version check.
    pub async fn soft_delete(&self, conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET deleted_at = ?1, updated_at = ?1, version = version + 1
            WHERE id = ?2 AND tenant_id = ?3 AND version = ?4 AND deleted_at IS NULL
            "#,
        )
        .bind(now)
        .bind(&invoice.id)
        .bind(self.tenant_id)
        .bind(invoice.version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::ConsistencyViolation(format!(
                "invoice {} changed since version {}",
                invoice.id, invoice.version
            )));
        }

        Ok(())
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub async fn insert_item(&self, conn: &mut SqliteConnection, item: &InvoiceItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (
                id, invoice_id, product_id, quantity, unit_price, discount_bps, total,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&item.id)
        .bind(&item.invoice_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.discount_bps)
        .bind(item.total)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn update_item(&self, conn: &mut SqliteConnection, item: &InvoiceItem) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoice_items
            SET product_id = ?1, quantity = ?2, unit_price = ?3, discount_bps = ?4,
                total = ?5, updated_at = ?6
            WHERE id = ?7
            "#,
        )
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.discount_bps)
        .bind(item.total)
        .bind(item.updated_at)
        .bind(&item.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice item", &item.id));
        }

        Ok(())
    }

    /// Item by id, only if its invoice is live and belongs to this tenant.
    pub async fn get_item(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
    ) -> DbResult<Option<InvoiceItem>> {
        let item = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT ii.id, ii.invoice_id, ii.product_id, ii.quantity, ii.unit_price,
                   ii.discount_bps, ii.total, ii.created_at, ii.updated_at
            FROM invoice_items ii
            JOIN invoices i ON i.id = ii.invoice_id
            WHERE ii.id = ?1 AND i.tenant_id = ?2 AND i.deleted_at IS NULL
            "#,
        )
        .bind(item_id)
        .bind(self.tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(item)
    }

    pub async fn items(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<Vec<InvoiceItem>> {
        let items = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT id, invoice_id, product_id, quantity, unit_price,
                   discount_bps, total, created_at, updated_at
            FROM invoice_items
            WHERE invoice_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(items)
    }

    /// Quantity invoiced per product, summed over duplicate lines.
    pub async fn invoiced_quantities(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<HashMap<String, Quantity>> {
        let rows = sqlx::query_as::<_, (String, Quantity)>(
            r#"
            SELECT product_id, COALESCE(SUM(quantity), 0)
            FROM invoice_items
            WHERE invoice_id = ?1
            GROUP BY product_id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().collect())
    }
}
