//! # Credit Note Engine
//!
//! Returns against a source invoice. A note is a draft until approved;
//! only approval moves stock and changes the invoice's net balance.
//!
//! ## Approval
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  approve(CN)                                                           │
//! │       │                                                                 │
//! │  BEGIN IMMEDIATE                                                        │
//! │       ├── status must be draft          ── InvalidStateTransition      │
//! │       ├── re-check caps vs. approved notes ── ExceedsInvoiceQuantity   │
//! │       ├── per item:                                                    │
//! │       │     sales return     → stock += q                              │
//! │       │     purchase return  → stock −= q   ── InsufficientStock       │
//! │       │     movement(credit_note_return)                               │
//! │       ├── draft → approved                                             │
//! │       └── invoice status re-derived against the new net total          │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Caps are checked when a draft is written and again at approval, since
//! two drafts may each fit on their own but not together.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use mizan_core::credit::{check_credit_caps, quantities_by_product};
use mizan_core::settlement::{invoice_total, line_total};
use mizan_core::validation::{validate_credit_note_items, validate_new_credit_note};
use mizan_core::{
    new_id, CoreError, CreditNote, CreditNoteDetail, CreditNoteItem, CreditNoteStatus,
    DocumentKind, Invoice, Money, MovementType, NewCreditNote, NewCreditNoteItem, Quantity,
};

use crate::engine::invoice::refresh_settlement;
use crate::engine::stock::{movement_at, post_delta, require_product, resolve_key};
use crate::engine::{next_document_number, require_location, retry_once};
use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::{CreditNoteRepository, InvoiceRepository};

/// Fails unless `items` fit within what the invoice carried, net of other
/// approved notes.
async fn check_caps(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    invoice: &Invoice,
    exclude_id: Option<&str>,
    items: &[(String, Quantity)],
) -> DbResult<()> {
    let invoiced = InvoiceRepository::new(tenant_id)
        .invoiced_quantities(conn, &invoice.id)
        .await?;
    let credited = CreditNoteRepository::new(tenant_id)
        .approved_quantities(conn, &invoice.id, exclude_id)
        .await?;

    check_credit_caps(&invoiced, &credited, items)?;
    Ok(())
}

fn requested(items: &[NewCreditNoteItem]) -> Vec<(String, Quantity)> {
    quantities_by_product(items.iter().map(|item| (item.product_id.as_str(), item.quantity)))
}

fn build_items(credit_note_id: &str, items: &[NewCreditNoteItem]) -> Vec<CreditNoteItem> {
    items
        .iter()
        .map(|item| CreditNoteItem {
            id: new_id(),
            credit_note_id: credit_note_id.to_string(),
            product_id: item.product_id.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total: line_total(item.quantity, item.unit_price, 0),
            reason: item.reason.clone(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CreditNoteEngine {
    db: Database,
}

impl CreditNoteEngine {
    pub(crate) fn new(db: Database) -> Self {
        CreditNoteEngine { db }
    }

    /// Creates a draft credit note against an invoice.
    ///
    /// Direction and counterparty come from the invoice; the location
    /// defaults to the invoice's.
    pub async fn create(&self, input: NewCreditNote) -> DbResult<CreditNoteDetail> {
        validate_new_credit_note(&input)?;
        retry_once("create_credit_note", || self.create_once(&input)).await
    }

    async fn create_once(&self, input: &NewCreditNote) -> DbResult<CreditNoteDetail> {
        let tenant_id = self.db.tenant_id();
        let mut tx = self.db.begin_immediate().await?;

        let invoice = InvoiceRepository::new(tenant_id)
            .require(&mut tx, &input.source_invoice_id)
            .await?;
        let location_id = input.location_id.as_deref().unwrap_or(invoice.location_id.as_str());
        let location = require_location(&mut tx, tenant_id, location_id).await?;

        for item in &input.items {
            require_product(&mut tx, tenant_id, &item.product_id).await?;
        }
        check_caps(&mut tx, tenant_id, &invoice, None, &requested(&input.items)).await?;

        let credit_note_date = input
            .credit_note_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let credit_note_number = next_document_number(
            &mut tx,
            tenant_id,
            &self.db.settings().numbering,
            DocumentKind::CreditNote,
            credit_note_date,
        )
        .await?;

        let id = new_id();
        let items = build_items(&id, &input.items);
        let now = Utc::now();
        let note = CreditNote {
            id,
            tenant_id: tenant_id.to_string(),
            credit_note_number,
            source_invoice_id: invoice.id.clone(),
            direction: invoice.direction,
            counterparty_id: invoice.counterparty_id.clone(),
            location_id: location.id,
            location_type: location.location_type,
            credit_note_date,
            total_amount: invoice_total(items.iter().map(|item| item.total)),
            status: CreditNoteStatus::Draft,
            notes: input.notes.clone(),
            created_by: input.created_by.clone(),
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let notes = CreditNoteRepository::new(tenant_id);
        notes.insert(&mut tx, &note).await?;
        for item in &items {
            notes.insert_item(&mut tx, item).await?;
        }

        tx.commit().await?;

        info!(
            credit_note_id = %note.id,
            number = %note.credit_note_number,
            invoice_id = %note.source_invoice_id,
            total = %note.total_amount,
            "Credit note drafted"
        );

        Ok(CreditNoteDetail {
            credit_note: note,
            items,
        })
    }

    /// Replaces a draft's lines.
    pub async fn update(
        &self,
        id: &str,
        items: Vec<NewCreditNoteItem>,
    ) -> DbResult<CreditNoteDetail> {
        validate_credit_note_items(&items)?;
        retry_once("update_credit_note", || self.update_once(id, &items)).await
    }

    async fn update_once(&self, id: &str, input: &[NewCreditNoteItem]) -> DbResult<CreditNoteDetail> {
        let tenant_id = self.db.tenant_id();
        let notes = CreditNoteRepository::new(tenant_id);
        let mut tx = self.db.begin_immediate().await?;

        let mut note = notes.require(&mut tx, id).await?;
        if !note.status.can_edit() {
            return Err(
                CoreError::invalid_transition("Credit note", id, note.status.as_str(), "edit").into(),
            );
        }

        let invoice = InvoiceRepository::new(tenant_id)
            .require(&mut tx, &note.source_invoice_id)
            .await?;
        for item in input {
            require_product(&mut tx, tenant_id, &item.product_id).await?;
        }
        check_caps(&mut tx, tenant_id, &invoice, Some(id), &requested(input)).await?;

        let items = build_items(id, input);
        note.total_amount = invoice_total(items.iter().map(|item| item.total));

        notes.delete_items(&mut tx, id).await?;
        for item in &items {
            notes.insert_item(&mut tx, item).await?;
        }
        notes.update_total(&mut tx, id, note.total_amount).await?;

        tx.commit().await?;

        debug!(credit_note_id = id, total = %note.total_amount, "Credit note updated");
        Ok(CreditNoteDetail {
            credit_note: note,
            items,
        })
    }

    /// Approves a draft: moves the returned goods and reduces what the
    /// invoice's counterparty owes.
    ///
    /// ## Errors
    /// * `InvalidStateTransition` - the note is not a draft
    /// * `ExceedsInvoiceQuantity` - other approvals consumed the headroom
    /// * `InsufficientStock` - a purchase return whose goods already left
    pub async fn approve(&self, id: &str, approved_by: Option<&str>) -> DbResult<CreditNoteDetail> {
        retry_once("approve_credit_note", || self.approve_once(id, approved_by)).await
    }

    async fn approve_once(&self, id: &str, approved_by: Option<&str>) -> DbResult<CreditNoteDetail> {
        let tenant_id = self.db.tenant_id();
        let notes = CreditNoteRepository::new(tenant_id);
        let mut tx = self.db.begin_immediate().await?;

        let mut note = notes.require(&mut tx, id).await?;
        if !note.status.can_approve() {
            return Err(
                CoreError::invalid_transition("Credit note", id, note.status.as_str(), "approve")
                    .into(),
            );
        }

        let mut invoice = InvoiceRepository::new(tenant_id)
            .require(&mut tx, &note.source_invoice_id)
            .await?;
        let items = notes.items(&mut tx, id).await?;

        let lines: Vec<(String, Quantity)> = items
            .iter()
            .map(|item| (item.product_id.clone(), item.quantity))
            .collect();
        check_caps(&mut tx, tenant_id, &invoice, Some(id), &lines).await?;

        for item in &items {
            let key = resolve_key(&mut tx, tenant_id, &item.product_id, &note.location_id).await?;
            let delta = note.direction.credit_note_stock_delta(item.quantity);
            let movement = movement_at(
                &key,
                MovementType::CreditNoteReturn,
                delta,
                Some(&note.id),
                item.reason.as_deref(),
                approved_by,
            );
            post_delta(&mut tx, tenant_id, &key, delta, &movement).await?;
        }

        let approved_at = Utc::now();
        notes
            .transition_from_draft(
                &mut tx,
                id,
                CreditNoteStatus::Approved,
                approved_by,
                Some(approved_at),
            )
            .await?;
        refresh_settlement(&mut tx, tenant_id, &mut invoice).await?;

        tx.commit().await?;

        note.status = CreditNoteStatus::Approved;
        note.approved_by = approved_by.map(str::to_string);
        note.approved_at = Some(approved_at);
        note.updated_at = approved_at;

        info!(
            credit_note_id = id,
            number = %note.credit_note_number,
            invoice_status = invoice.payment_status.as_str(),
            "Credit note approved"
        );

        Ok(CreditNoteDetail {
            credit_note: note,
            items,
        })
    }

    /// Cancels a draft. No stock effect.
    pub async fn cancel(&self, id: &str) -> DbResult<()> {
        retry_once("cancel_credit_note", || self.cancel_once(id)).await
    }

    async fn cancel_once(&self, id: &str) -> DbResult<()> {
        let notes = CreditNoteRepository::new(self.db.tenant_id());
        let mut tx = self.db.begin_immediate().await?;

        let note = notes.require(&mut tx, id).await?;
        if !note.status.can_cancel() {
            return Err(
                CoreError::invalid_transition("Credit note", id, note.status.as_str(), "cancel")
                    .into(),
            );
        }
        notes
            .transition_from_draft(&mut tx, id, CreditNoteStatus::Cancelled, None, None)
            .await?;

        tx.commit().await?;
        info!(credit_note_id = id, "Credit note cancelled");
        Ok(())
    }

    /// Soft-deletes a draft or cancelled note. Approved notes are permanent.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        retry_once("delete_credit_note", || self.delete_once(id)).await
    }

    async fn delete_once(&self, id: &str) -> DbResult<()> {
        let notes = CreditNoteRepository::new(self.db.tenant_id());
        let mut tx = self.db.begin_immediate().await?;

        let note = notes.require(&mut tx, id).await?;
        if !note.status.can_delete() {
            return Err(
                CoreError::invalid_transition("Credit note", id, note.status.as_str(), "delete")
                    .into(),
            );
        }
        notes.soft_delete(&mut tx, id).await?;

        tx.commit().await?;
        info!(credit_note_id = id, "Credit note deleted");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<CreditNoteDetail> {
        let notes = CreditNoteRepository::new(self.db.tenant_id());
        let mut conn = self.db.pool().acquire().await?;

        let credit_note = notes.require(&mut conn, id).await?;
        let items = notes.items(&mut conn, id).await?;
        Ok(CreditNoteDetail { credit_note, items })
    }

    /// Newest first, optionally only those against one invoice.
    pub async fn list(&self, source_invoice_id: Option<&str>) -> DbResult<Vec<CreditNote>> {
        let mut conn = self.db.pool().acquire().await?;
        CreditNoteRepository::new(self.db.tenant_id())
            .list(&mut conn, source_invoice_id)
            .await
    }

    /// Σ approved credit against an invoice.
    pub async fn approved_credit_total(&self, invoice_id: &str) -> DbResult<Money> {
        let mut conn = self.db.pool().acquire().await?;
        CreditNoteRepository::new(self.db.tenant_id())
            .approved_total(&mut conn, invoice_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use crate::error::DbError;
    use chrono::NaiveDate;
    use mizan_core::{Direction, NewPayment, PaymentMethod, PaymentStatus, UpdateInvoiceItem};

    fn return_line(product_id: &str, qty: i64, price_dollars: i64) -> NewCreditNoteItem {
        NewCreditNoteItem {
            product_id: product_id.to_string(),
            quantity: units(qty),
            unit_price: dollars(price_dollars),
            reason: Some("damaged".to_string()),
        }
    }

    fn credit(invoice_id: &str, items: Vec<NewCreditNoteItem>) -> NewCreditNote {
        NewCreditNote {
            source_invoice_id: invoice_id.to_string(),
            location_id: None,
            credit_note_date: NaiveDate::from_ymd_opt(2026, 10, 5),
            notes: None,
            items,
            created_by: Some("tester".to_string()),
        }
    }

    #[tokio::test]
    async fn test_purchase_return_caps() {
        let db = ledger().await;
        let purchase = stock_up(&db, PRODUCT_A, WAREHOUSE, 100).await;
        let invoice_id = purchase.invoice.id.as_str();
        let notes = db.credit_notes();

        let first = notes.create(credit(invoice_id, vec![return_line(PRODUCT_A, 60, 1)])).await.unwrap();
        assert_eq!(first.credit_note.credit_note_number, "CN-202610-00001");
        assert_eq!(first.credit_note.status, CreditNoteStatus::Draft);
        assert_eq!(first.credit_note.direction, Direction::Purchase);
        assert_eq!(first.credit_note.counterparty_id.as_deref(), Some(VENDOR));

        notes.approve(&first.credit_note.id, Some("manager")).await.unwrap();
        assert_eq!(db.stock().get_stock(PRODUCT_A, WAREHOUSE).await.unwrap(), units(40));

        let err = notes
            .create(credit(invoice_id, vec![return_line(PRODUCT_A, 50, 1)]))
            .await
            .unwrap_err();
        assert_eq!(
            err.as_core(),
            Some(&CoreError::ExceedsInvoiceQuantity {
                product_id: PRODUCT_A.to_string(),
                invoiced: units(100),
                already_credited: units(60),
                requested: units(50),
            })
        );

        let second = notes.create(credit(invoice_id, vec![return_line(PRODUCT_A, 40, 1)])).await.unwrap();
        notes.approve(&second.credit_note.id, None).await.unwrap();
        assert!(db.stock().get_stock(PRODUCT_A, WAREHOUSE).await.unwrap().is_zero());

        assert_eq!(notes.approved_credit_total(invoice_id).await.unwrap(), dollars(100));
        assert_eq!(db.invoices().balance(invoice_id).await.unwrap(), Money::zero());

        let moves = db.stock().movements_for(&second.credit_note.id).await.unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].movement_type, MovementType::CreditNoteReturn);
        assert_eq!(moves[0].quantity, -units(40));
    }

    #[tokio::test]
    async fn test_sales_return_credits_stock_and_nets_balance() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, STORE, 10).await;
        let sale = db
            .invoices()
            .create(new_invoice(Direction::Sales, CUSTOMER, STORE, vec![item(PRODUCT_A, 4, 5)]))
            .await
            .unwrap()
            .invoice;
        db.payments()
            .create_single(NewPayment {
                invoice_id: sale.id.clone(),
                amount: dollars(10),
                method: PaymentMethod::Card,
                reference_number: None,
                notes: None,
                created_by: None,
            })
            .await
            .unwrap();

        let note = db
            .credit_notes()
            .create(credit(&sale.id, vec![return_line(PRODUCT_A, 2, 5)]))
            .await
            .unwrap();
        // Drafts have no effect.
        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(6));

        let approved = db.credit_notes().approve(&note.credit_note.id, Some("manager")).await.unwrap();
        assert_eq!(approved.credit_note.status, CreditNoteStatus::Approved);
        assert_eq!(approved.credit_note.approved_by.as_deref(), Some("manager"));

        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(8));
        let invoice = db.invoices().get(&sale.id).await.unwrap().invoice;
        assert_eq!(invoice.total_amount, dollars(20));
        assert_eq!(invoice.payment_status, PaymentStatus::Paid);
        assert_eq!(db.invoices().balance(&sale.id).await.unwrap(), Money::zero());
    }

    #[tokio::test]
    async fn test_purchase_return_after_resale_fails() {
        let db = ledger().await;
        let purchase = stock_up(&db, PRODUCT_A, STORE, 10).await;
        db.invoices()
            .create(new_invoice(Direction::Sales, CUSTOMER, STORE, vec![item(PRODUCT_A, 8, 5)]))
            .await
            .unwrap();

        let note = db
            .credit_notes()
            .create(credit(&purchase.invoice.id, vec![return_line(PRODUCT_A, 5, 1)]))
            .await
            .unwrap();
        let err = db.credit_notes().approve(&note.credit_note.id, None).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InsufficientStock { .. })));

        let fetched = db.credit_notes().get(&note.credit_note.id).await.unwrap();
        assert_eq!(fetched.credit_note.status, CreditNoteStatus::Draft);
        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(2));
    }

    #[tokio::test]
    async fn test_approval_rechecks_caps_across_drafts() {
        let db = ledger().await;
        let purchase = stock_up(&db, PRODUCT_A, WAREHOUSE, 10).await;
        let notes = db.credit_notes();

        let first = notes.create(credit(&purchase.invoice.id, vec![return_line(PRODUCT_A, 6, 1)])).await.unwrap();
        let second = notes.create(credit(&purchase.invoice.id, vec![return_line(PRODUCT_A, 6, 1)])).await.unwrap();

        notes.approve(&first.credit_note.id, None).await.unwrap();
        let err = notes.approve(&second.credit_note.id, None).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::ExceedsInvoiceQuantity { .. })));
        assert_eq!(db.stock().get_stock(PRODUCT_A, WAREHOUSE).await.unwrap(), units(4));
    }

    #[tokio::test]
    async fn test_product_not_on_invoice_rejected() {
        let db = ledger().await;
        let purchase = stock_up(&db, PRODUCT_A, WAREHOUSE, 10).await;

        let err = db
            .credit_notes()
            .create(credit(&purchase.invoice.id, vec![return_line(PRODUCT_B, 1, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::ExceedsInvoiceQuantity { invoiced, .. }) if invoiced.is_zero()
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let db = ledger().await;
        let purchase = stock_up(&db, PRODUCT_A, WAREHOUSE, 10).await;
        let notes = db.credit_notes();

        let cancelled = notes.create(credit(&purchase.invoice.id, vec![return_line(PRODUCT_A, 1, 1)])).await.unwrap();
        notes.cancel(&cancelled.credit_note.id).await.unwrap();
        let err = notes.approve(&cancelled.credit_note.id, None).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InvalidStateTransition { status, .. }) if status == "cancelled"
        ));
        notes.delete(&cancelled.credit_note.id).await.unwrap();
        assert!(matches!(
            notes.get(&cancelled.credit_note.id).await,
            Err(DbError::NotFound { .. })
        ));

        let approved = notes.create(credit(&purchase.invoice.id, vec![return_line(PRODUCT_A, 2, 1)])).await.unwrap();
        let id = approved.credit_note.id.as_str();
        notes.approve(id, None).await.unwrap();
        assert!(notes.cancel(id).await.is_err());
        assert!(notes.delete(id).await.is_err());
        assert!(notes.update(id, vec![return_line(PRODUCT_A, 1, 1)]).await.is_err());
        assert!(notes.approve(id, None).await.is_err());

        assert_eq!(notes.list(Some(&purchase.invoice.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_draft_replaces_lines() {
        let db = ledger().await;
        let purchase = stock_up(&db, PRODUCT_A, WAREHOUSE, 10).await;
        let notes = db.credit_notes();

        let draft = notes.create(credit(&purchase.invoice.id, vec![return_line(PRODUCT_A, 2, 1)])).await.unwrap();
        let updated = notes
            .update(&draft.credit_note.id, vec![return_line(PRODUCT_A, 3, 1), return_line(PRODUCT_A, 1, 1)])
            .await
            .unwrap();
        assert_eq!(updated.credit_note.total_amount, dollars(4));

        let fetched = notes.get(&draft.credit_note.id).await.unwrap();
        assert_eq!(fetched.items.len(), 2);
        assert_eq!(fetched.credit_note.total_amount, dollars(4));

        let err = notes
            .update(&draft.credit_note.id, vec![return_line(PRODUCT_A, 11, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::ExceedsInvoiceQuantity { .. })));
    }

    #[tokio::test]
    async fn test_invoice_delete_respects_credit_notes() {
        let db = ledger().await;
        let purchase = stock_up(&db, PRODUCT_A, WAREHOUSE, 10).await;
        let other = stock_up(&db, PRODUCT_B, WAREHOUSE, 10).await;
        let notes = db.credit_notes();

        let approved = notes.create(credit(&purchase.invoice.id, vec![return_line(PRODUCT_A, 1, 1)])).await.unwrap();
        notes.approve(&approved.credit_note.id, None).await.unwrap();
        let err = db.invoices().delete(&purchase.invoice.id, None).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InvalidStateTransition { status, .. }) if status == "credited"
        ));

        let draft = notes.create(credit(&other.invoice.id, vec![return_line(PRODUCT_B, 1, 1)])).await.unwrap();
        db.invoices().delete(&other.invoice.id, None).await.unwrap();
        let fetched = notes.get(&draft.credit_note.id).await.unwrap();
        assert_eq!(fetched.credit_note.status, CreditNoteStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_credited_line_cannot_shrink_below_returns() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, STORE, 20).await;
        let sale = db
            .invoices()
            .create(new_invoice(Direction::Sales, CUSTOMER, STORE, vec![item(PRODUCT_A, 10, 5)]))
            .await
            .unwrap();
        let line_id = sale.items[0].id.clone();

        let note = db
            .credit_notes()
            .create(credit(&sale.invoice.id, vec![return_line(PRODUCT_A, 8, 5)]))
            .await
            .unwrap();
        db.credit_notes().approve(&note.credit_note.id, None).await.unwrap();
        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(18));

        let edit = |product_id: &str, qty: i64| UpdateInvoiceItem {
            product_id: product_id.to_string(),
            quantity: units(qty),
            unit_price: dollars(5),
            discount_bps: 0,
            updated_by: Some("tester".to_string()),
        };

        let err = db.invoices().update_item(&line_id, edit(PRODUCT_A, 2)).await.unwrap_err();
        assert_eq!(
            err.as_core(),
            Some(&CoreError::ExceedsInvoiceQuantity {
                product_id: PRODUCT_A.to_string(),
                invoiced: units(2),
                already_credited: units(8),
                requested: Quantity::zero(),
            })
        );

        let err = db.invoices().update_item(&line_id, edit(PRODUCT_B, 10)).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::ExceedsInvoiceQuantity { .. })));

        // Nothing moved and the line is untouched.
        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(18));
        let fetched = db.invoices().get(&sale.invoice.id).await.unwrap();
        assert_eq!(fetched.items[0].product_id, PRODUCT_A);
        assert_eq!(fetched.items[0].quantity, units(10));

        // Down to exactly the credited quantity is still allowed.
        db.invoices().update_item(&line_id, edit(PRODUCT_A, 8)).await.unwrap();
        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(20));
    }
}
