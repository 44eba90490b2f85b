//! # Credit Note Repository
//!
//! Credit notes and their lines. Soft-deleted notes are invisible to every
//! query here, including the approved-quantity sums used by the cap check.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use mizan_core::{CreditNote, CreditNoteItem, CreditNoteStatus, Money, Quantity};

#[derive(Debug, Clone, Copy)]
pub struct CreditNoteRepository<'t> {
    tenant_id: &'t str,
}

impl<'t> CreditNoteRepository<'t> {
    pub fn new(tenant_id: &'t str) -> Self {
        CreditNoteRepository { tenant_id }
    }

    pub async fn insert(&self, conn: &mut SqliteConnection, note: &CreditNote) -> DbResult<()> {
        debug!(id = %note.id, number = %note.credit_note_number, "Inserting credit note");

        sqlx::query(
            r#"
            INSERT INTO credit_notes (
                id, tenant_id, credit_note_number, source_invoice_id, direction,
                counterparty_id, location_id, location_type, credit_note_date, total_amount,
                status, notes, created_by, approved_by, approved_at,
                created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
        )
        .bind(&note.id)
        .bind(self.tenant_id)
        .bind(&note.credit_note_number)
        .bind(&note.source_invoice_id)
        .bind(note.direction)
        .bind(&note.counterparty_id)
        .bind(&note.location_id)
        .bind(note.location_type)
        .bind(note.credit_note_date)
        .bind(note.total_amount)
        .bind(note.status)
        .bind(&note.notes)
        .bind(&note.created_by)
        .bind(&note.approved_by)
        .bind(note.approved_at)
        .bind(note.created_at)
        .bind(note.updated_at)
        .bind(note.deleted_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(&self, conn: &mut SqliteConnection, item: &CreditNoteItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO credit_note_items (
                id, credit_note_id, product_id, quantity, unit_price, total, reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&item.id)
        .bind(&item.credit_note_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total)
        .bind(&item.reason)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn delete_items(&self, conn: &mut SqliteConnection, credit_note_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM credit_note_items WHERE credit_note_id = ?1")
            .bind(credit_note_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    pub async fn get(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<CreditNote>> {
        let note = sqlx::query_as::<_, CreditNote>(
            r#"
            SELECT id, tenant_id, credit_note_number, source_invoice_id, direction,
                   counterparty_id, location_id, location_type, credit_note_date, total_amount,
                   status, notes, created_by, approved_by, approved_at,
                   created_at, updated_at, deleted_at
            FROM credit_notes
            WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(self.tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(note)
    }

    pub async fn require(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<CreditNote> {
        self.get(conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Credit note", id))
    }

    pub async fn items(
        &self,
        conn: &mut SqliteConnection,
        credit_note_id: &str,
    ) -> DbResult<Vec<CreditNoteItem>> {
        let items = sqlx::query_as::<_, CreditNoteItem>(
            r#"
            SELECT id, credit_note_id, product_id, quantity, unit_price, total, reason
            FROM credit_note_items
            WHERE credit_note_id = ?1
            ORDER BY id
            "#,
        )
        .bind(credit_note_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(items)
    }

    /// Newest first, optionally only those against one invoice.
    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        source_invoice_id: Option<&str>,
    ) -> DbResult<Vec<CreditNote>> {
        let notes = sqlx::query_as::<_, CreditNote>(
            r#"
            SELECT id, tenant_id, credit_note_number, source_invoice_id, direction,
                   counterparty_id, location_id, location_type, credit_note_date, total_amount,
                   status, notes, created_by, approved_by, approved_at,
                   created_at, updated_at, deleted_at
            FROM credit_notes
            WHERE tenant_id = ?1 AND deleted_at IS NULL
              AND (?2 IS NULL OR source_invoice_id = ?2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(self.tenant_id)
        .bind(source_invoice_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(notes)
    }

    pub async fn update_total(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        total: Money,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE credit_notes SET total_amount = ?1, updated_at = ?2 WHERE id = ?3 AND tenant_id = ?4",
        )
        .bind(total)
        .bind(Utc::now())
        .bind(id)
        .bind(self.tenant_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Moves a note out of `draft`.
    ///
    /// The `status = 'draft'` guard makes the transition happen at most
    /// once; zero rows means another writer got there first.
    pub async fn transition_from_draft(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        to: CreditNoteStatus,
        approved_by: Option<&str>,
        approved_at: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE credit_notes
            SET status = ?1, approved_by = ?2, approved_at = ?3, updated_at = ?4
            WHERE id = ?5 AND tenant_id = ?6 AND status = 'draft' AND deleted_at IS NULL
            "#,
        )
        .bind(to)
        .bind(approved_by)
        .bind(approved_at)
        .bind(Utc::now())
        .bind(id)
        .bind(self.tenant_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::ConsistencyViolation(format!(
                "credit note {} left draft concurrently",
                id
            )));
        }

        Ok(())
    }

    pub async fn soft_delete(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE credit_notes SET deleted_at = ?1, updated_at = ?1
            WHERE id = ?2 AND tenant_id = ?3 AND status != 'approved' AND deleted_at IS NULL
            "#,
        )
        .bind(now)
        .bind(id)
        .bind(self.tenant_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Cancels every draft note against an invoice.
    pub async fn cancel_drafts_for_invoice(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE credit_notes SET status = 'cancelled', updated_at = ?1
            WHERE tenant_id = ?2 AND source_invoice_id = ?3 AND status = 'draft'
              AND deleted_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(self.tenant_id)
        .bind(invoice_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_approved_for_invoice(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM credit_notes
            WHERE tenant_id = ?1 AND source_invoice_id = ?2 AND status = 'approved'
              AND deleted_at IS NULL
            "#,
        )
        .bind(self.tenant_id)
        .bind(invoice_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    /// Σ total_amount of approved notes against an invoice.
    pub async fn approved_total(&self, conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Money> {
        let total = sqlx::query_scalar::<_, Money>(
            r#"
            SELECT COALESCE(SUM(total_amount), 0) FROM credit_notes
            WHERE tenant_id = ?1 AND source_invoice_id = ?2 AND status = 'approved'
              AND deleted_at IS NULL
            "#,
        )
        .bind(self.tenant_id)
        .bind(invoice_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(total)
    }

    /// Approved credited quantity per product against an invoice, leaving
    /// out the note `exclude_id`.
    pub async fn approved_quantities(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: &str,
        exclude_id: Option<&str>,
    ) -> DbResult<HashMap<String, Quantity>> {
        let rows = sqlx::query_as::<_, (String, Quantity)>(
            r#"
            SELECT ci.product_id, COALESCE(SUM(ci.quantity), 0)
            FROM credit_note_items ci
            JOIN credit_notes cn ON cn.id = ci.credit_note_id
            WHERE cn.tenant_id = ?1 AND cn.source_invoice_id = ?2
              AND cn.status = 'approved' AND cn.deleted_at IS NULL
              AND (?3 IS NULL OR cn.id != ?3)
            GROUP BY ci.product_id
            "#,
        )
        .bind(self.tenant_id)
        .bind(invoice_id)
        .bind(exclude_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().collect())
    }
}
