//! # Invoice Engine
//!
//! Sales and purchase invoices: creation with stock effects, line edits,
//! total recalculation and deletion with stock reversal.
//!
//! ## Create
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  NewInvoice                                                            │
//! │       │                                                                 │
//! │       ├── validate lines, paid >= 0, method when paid > 0              │
//! │       │                                                                 │
//! │  BEGIN IMMEDIATE                                                        │
//! │       ├── resolve location type + products                            │
//! │       ├── sales: pre-check stock per product   ── InsufficientStock    │
//! │       ├── next number  SI-202610-00001 / PI-...                        │
//! │       ├── insert invoice + items                                       │
//! │       ├── per item: stock ± q, movement (sale / purchase)             │
//! │       └── paid > 0: single payment row                                 │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Settlement
//! `total_amount` is the gross sum of line totals. Status is always derived
//! against the NET total (gross minus approved credit notes) by
//! [`save_settlement`]; the payment and credit-note engines call the same
//! helpers so there is one definition of "balance".

use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use mizan_core::credit::quantities_by_product;
use mizan_core::settlement::{invoice_total, line_total, payment_status, settlement_total};
use mizan_core::validation::{validate_invoice_item, validate_item_update, validate_new_invoice};
use mizan_core::{
    new_id, AllocationType, CoreError, Direction, Invoice, InvoiceDetail, InvoiceFilter,
    InvoiceItem, Money, MovementType, NewInvoice, NewInvoiceItem, Payment, Quantity, StockKey,
    UpdateInvoiceItem,
};

use crate::engine::stock::{ensure_available, movement_at, post_delta, resolve_key};
use crate::engine::{next_document_number, require_location, retry_once};
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::{CreditNoteRepository, InvoiceRepository, PaymentRepository};

// =============================================================================
// Settlement Helpers
// =============================================================================

/// Gross total minus approved credit notes, floored at zero.
pub(crate) async fn net_total(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    invoice: &Invoice,
) -> DbResult<Money> {
    let credits = CreditNoteRepository::new(tenant_id)
        .approved_total(conn, &invoice.id)
        .await?;
    Ok(settlement_total(invoice.total_amount, credits))
}

/// Derives the status against `net` and writes total, paid and status
/// under the version check.
pub(crate) async fn save_settlement(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    invoice: &mut Invoice,
    net: Money,
) -> DbResult<()> {
    invoice.payment_status = payment_status(invoice.paid_amount, net);
    InvoiceRepository::new(tenant_id)
        .save_balance(conn, invoice)
        .await
}

/// Recomputes gross total and status from the stored lines.
///
/// ## Returns
/// `true` when something changed and was written, `false` when the stored
/// figures were already correct.
pub(crate) async fn refresh_settlement(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    invoice: &mut Invoice,
) -> DbResult<bool> {
    let items = InvoiceRepository::new(tenant_id)
        .items(conn, &invoice.id)
        .await?;
    let gross = invoice_total(items.iter().map(|item| item.total));

    let credits = CreditNoteRepository::new(tenant_id)
        .approved_total(conn, &invoice.id)
        .await?;
    let net = settlement_total(gross, credits);
    let status = payment_status(invoice.paid_amount, net);

    if gross == invoice.total_amount && status == invoice.payment_status {
        return Ok(false);
    }

    invoice.total_amount = gross;
    save_settlement(conn, tenant_id, invoice, net).await?;
    Ok(true)
}

/// Refuses a line edit that would leave the line's product invoiced below
/// what approved credit notes have already returned.
async fn ensure_credit_cover(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    invoice: &Invoice,
    existing: &InvoiceItem,
    update: &UpdateInvoiceItem,
) -> DbResult<()> {
    let credited = CreditNoteRepository::new(tenant_id)
        .approved_quantities(conn, &invoice.id, None)
        .await?;
    let Some(&already_credited) = credited.get(&existing.product_id) else {
        return Ok(());
    };

    let invoiced = InvoiceRepository::new(tenant_id)
        .invoiced_quantities(conn, &invoice.id)
        .await?;
    let mut remaining = invoiced
        .get(&existing.product_id)
        .copied()
        .unwrap_or_default()
        - existing.quantity;
    if existing.product_id == update.product_id {
        remaining += update.quantity;
    }

    if already_credited > remaining {
        return Err(CoreError::ExceedsInvoiceQuantity {
            product_id: existing.product_id.clone(),
            invoiced: remaining,
            already_credited,
            requested: Quantity::zero(),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Invoice Engine
// =============================================================================

#[derive(Debug, Clone)]
pub struct InvoiceEngine {
    db: Database,
}

impl InvoiceEngine {
    pub(crate) fn new(db: Database) -> Self {
        InvoiceEngine { db }
    }

    /// Creates an invoice, moves stock and records any upfront payment.
    ///
    /// ## Errors
    /// * `InsufficientStock` - a sales line exceeds stock at the location
    /// * `NotFound` - unknown location or product
    /// * `Validation` - empty lines, non-positive quantity, negative price,
    ///   discount over 100 %, or a payment without a method
    pub async fn create(&self, input: NewInvoice) -> DbResult<InvoiceDetail> {
        validate_new_invoice(&input)?;
        retry_once("create_invoice", || self.create_once(&input)).await
    }

    async fn create_once(&self, input: &NewInvoice) -> DbResult<InvoiceDetail> {
        let tenant_id = self.db.tenant_id();
        let direction = input.direction;
        let mut tx = self.db.begin_immediate().await?;

        let location = require_location(&mut tx, tenant_id, &input.location_id).await?;

        let mut keys: HashMap<String, StockKey> = HashMap::new();
        for line in &input.items {
            if !keys.contains_key(&line.product_id) {
                let key = resolve_key(&mut tx, tenant_id, &line.product_id, &location.id).await?;
                keys.insert(line.product_id.clone(), key);
            }
        }

        if direction == Direction::Sales {
            let required = quantities_by_product(
                input
                    .items
                    .iter()
                    .map(|line| (line.product_id.as_str(), line.quantity)),
            );
            ensure_available(&mut tx, tenant_id, &keys, &required).await?;
        }

        let invoice_date = input
            .invoice_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let invoice_number = next_document_number(
            &mut tx,
            tenant_id,
            &self.db.settings().numbering,
            direction.document_kind(),
            invoice_date,
        )
        .await?;

        let now = Utc::now();
        let invoice_id = new_id();
        let items: Vec<InvoiceItem> = input
            .items
            .iter()
            .map(|line| build_item(&invoice_id, line, now))
            .collect();
        let total = invoice_total(items.iter().map(|item| item.total));

        let invoice = Invoice {
            id: invoice_id,
            tenant_id: tenant_id.to_string(),
            direction,
            invoice_number,
            counterparty_id: input.counterparty_id.clone(),
            location_id: location.id.clone(),
            location_type: location.location_type,
            total_amount: total,
            paid_amount: input.paid_amount,
            payment_status: payment_status(input.paid_amount, total),
            payment_method: input.payment_method,
            notes: input.notes.clone(),
            invoice_date,
            created_by: input.created_by.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 1,
        };

        let invoices = InvoiceRepository::new(tenant_id);
        invoices.insert(&mut tx, &invoice).await?;

        for item in &items {
            invoices.insert_item(&mut tx, item).await?;

            let Some(key) = keys.get(&item.product_id) else {
                return Err(DbError::not_found("Product", item.product_id.as_str()));
            };
            let delta = direction.invoice_stock_delta(item.quantity);
            let movement = movement_at(
                key,
                direction.movement_type(),
                delta,
                Some(&invoice.id),
                None,
                input.created_by.as_deref(),
            );
            post_delta(&mut tx, tenant_id, key, delta, &movement).await?;
        }

        if invoice.paid_amount.is_positive() {
            if let Some(method) = invoice.payment_method {
                let payment = Payment {
                    id: new_id(),
                    tenant_id: tenant_id.to_string(),
                    invoice_id: Some(invoice.id.clone()),
                    direction,
                    counterparty_id: invoice.counterparty_id.clone(),
                    amount: invoice.paid_amount,
                    method,
                    reference_number: None,
                    notes: None,
                    allocation_type: AllocationType::Single,
                    total_allocated: invoice.paid_amount,
                    unallocated_amount: Money::zero(),
                    created_by: input.created_by.clone(),
                    created_at: now,
                };
                PaymentRepository::new(tenant_id)
                    .insert(&mut tx, &payment)
                    .await?;
            }
        }

        tx.commit().await?;

        info!(
            invoice_id = %invoice.id,
            number = %invoice.invoice_number,
            direction = %direction,
            total = %invoice.total_amount,
            status = invoice.payment_status.as_str(),
            "Invoice created"
        );

        Ok(InvoiceDetail { invoice, items })
    }

    pub async fn get(&self, id: &str) -> DbResult<InvoiceDetail> {
        let repo = InvoiceRepository::new(self.db.tenant_id());
        let mut conn = self.db.pool().acquire().await?;

        let invoice = repo.require(&mut conn, id).await?;
        let items = repo.items(&mut conn, id).await?;
        Ok(InvoiceDetail { invoice, items })
    }

    /// Live invoices, newest first.
    pub async fn list(&self, filter: &InvoiceFilter) -> DbResult<Vec<Invoice>> {
        let mut conn = self.db.pool().acquire().await?;
        InvoiceRepository::new(self.db.tenant_id())
            .list(&mut conn, filter)
            .await
    }

    /// Net amount still owed on an invoice.
    pub async fn balance(&self, id: &str) -> DbResult<Money> {
        let tenant_id = self.db.tenant_id();
        let mut conn = self.db.pool().acquire().await?;
        let invoice = InvoiceRepository::new(tenant_id).require(&mut conn, id).await?;
        let net = net_total(&mut conn, tenant_id, &invoice).await?;
        Ok(net - invoice.paid_amount)
    }

    /// Adds a line, moves its stock and refreshes the invoice totals.
    pub async fn add_item(&self, invoice_id: &str, line: NewInvoiceItem) -> DbResult<InvoiceItem> {
        validate_invoice_item(&line)?;
        retry_once("add_invoice_item", || self.add_item_once(invoice_id, &line)).await
    }

    async fn add_item_once(&self, invoice_id: &str, line: &NewInvoiceItem) -> DbResult<InvoiceItem> {
        let tenant_id = self.db.tenant_id();
        let invoices = InvoiceRepository::new(tenant_id);
        let mut tx = self.db.begin_immediate().await?;

        let mut invoice = invoices.require(&mut tx, invoice_id).await?;
        let key = resolve_key(&mut tx, tenant_id, &line.product_id, &invoice.location_id).await?;

        let item = build_item(&invoice.id, line, Utc::now());
        invoices.insert_item(&mut tx, &item).await?;

        let delta = invoice.direction.invoice_stock_delta(item.quantity);
        let movement = movement_at(
            &key,
            invoice.direction.movement_type(),
            delta,
            Some(&invoice.id),
            None,
            None,
        );
        post_delta(&mut tx, tenant_id, &key, delta, &movement).await?;

        refresh_settlement(&mut tx, tenant_id, &mut invoice).await?;
        tx.commit().await?;

        debug!(invoice_id, item_id = %item.id, "Invoice item added");
        Ok(item)
    }

    /// Edits a line.
    ///
    /// Changing the product reverses the old product's full quantity with an
    /// `adjustment` movement and applies the new product's full quantity.
    /// Changing only the quantity applies the difference.
    ///
    /// ## Errors
    /// * `ExceedsInvoiceQuantity` - the edit would leave the product invoiced
    ///   below what approved credit notes already returned
    /// * `InsufficientStock` - a sales edit needs more stock than is there
    pub async fn update_item(&self, item_id: &str, update: UpdateInvoiceItem) -> DbResult<InvoiceItem> {
        validate_item_update(&update)?;
        retry_once("update_invoice_item", || self.update_item_once(item_id, &update)).await
    }

    async fn update_item_once(
        &self,
        item_id: &str,
        update: &UpdateInvoiceItem,
    ) -> DbResult<InvoiceItem> {
        let tenant_id = self.db.tenant_id();
        let invoices = InvoiceRepository::new(tenant_id);
        let mut tx = self.db.begin_immediate().await?;

        let existing = invoices
            .get_item(&mut tx, item_id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice item", item_id))?;
        let mut invoice = invoices.require(&mut tx, &existing.invoice_id).await?;
        let direction = invoice.direction;
        let reference = Some(invoice.id.as_str());
        let updated_by = update.updated_by.as_deref();

        ensure_credit_cover(&mut tx, tenant_id, &invoice, &existing, update).await?;

        if existing.product_id != update.product_id {
            let old_key =
                resolve_key(&mut tx, tenant_id, &existing.product_id, &invoice.location_id).await?;
            let new_key =
                resolve_key(&mut tx, tenant_id, &update.product_id, &invoice.location_id).await?;

            let reversal = -direction.invoice_stock_delta(existing.quantity);
            let movement = movement_at(
                &old_key,
                MovementType::Adjustment,
                reversal,
                reference,
                Some("invoice line product changed"),
                updated_by,
            );
            post_delta(&mut tx, tenant_id, &old_key, reversal, &movement).await?;

            let delta = direction.invoice_stock_delta(update.quantity);
            let movement = movement_at(
                &new_key,
                direction.movement_type(),
                delta,
                reference,
                None,
                updated_by,
            );
            post_delta(&mut tx, tenant_id, &new_key, delta, &movement).await?;
        } else if existing.quantity != update.quantity {
            let key =
                resolve_key(&mut tx, tenant_id, &existing.product_id, &invoice.location_id).await?;
            let delta = direction.invoice_stock_delta(update.quantity - existing.quantity);
            let movement = movement_at(
                &key,
                direction.movement_type(),
                delta,
                reference,
                None,
                updated_by,
            );
            post_delta(&mut tx, tenant_id, &key, delta, &movement).await?;
        }

        let item = InvoiceItem {
            product_id: update.product_id.clone(),
            quantity: update.quantity,
            unit_price: update.unit_price,
            discount_bps: update.discount_bps,
            total: line_total(update.quantity, update.unit_price, update.discount_bps),
            updated_at: Utc::now(),
            ..existing
        };
        invoices.update_item(&mut tx, &item).await?;

        refresh_settlement(&mut tx, tenant_id, &mut invoice).await?;
        tx.commit().await?;

        debug!(item_id, invoice_id = %invoice.id, "Invoice item updated");
        Ok(item)
    }

    /// Re-derives total and status from the stored lines. Writes only when
    /// something changed, so repeated calls are no-ops.
    pub async fn recalculate_totals(&self, invoice_id: &str) -> DbResult<Invoice> {
        retry_once("recalculate_totals", || self.recalculate_once(invoice_id)).await
    }

    async fn recalculate_once(&self, invoice_id: &str) -> DbResult<Invoice> {
        let tenant_id = self.db.tenant_id();
        let mut tx = self.db.begin_immediate().await?;

        let mut invoice = InvoiceRepository::new(tenant_id)
            .require(&mut tx, invoice_id)
            .await?;
        let changed = refresh_settlement(&mut tx, tenant_id, &mut invoice).await?;
        tx.commit().await?;

        if changed {
            info!(invoice_id, total = %invoice.total_amount, "Invoice totals recalculated");
        }
        Ok(invoice)
    }

    /// Soft-deletes an invoice and reverses its stock effect.
    ///
    /// Draft credit notes against it are cancelled and its single payments
    /// removed. Refused while FIFO allocations or approved credit notes
    /// point at it.
    pub async fn delete(&self, invoice_id: &str, deleted_by: Option<&str>) -> DbResult<()> {
        retry_once("delete_invoice", || self.delete_once(invoice_id, deleted_by)).await
    }

    async fn delete_once(&self, invoice_id: &str, deleted_by: Option<&str>) -> DbResult<()> {
        let tenant_id = self.db.tenant_id();
        let invoices = InvoiceRepository::new(tenant_id);
        let payments = PaymentRepository::new(tenant_id);
        let credit_notes = CreditNoteRepository::new(tenant_id);
        let mut tx = self.db.begin_immediate().await?;

        let invoice = invoices.require(&mut tx, invoice_id).await?;

        if payments.count_allocations_for_invoice(&mut tx, invoice_id).await? > 0 {
            return Err(
                CoreError::invalid_transition("Invoice", invoice_id, "allocated", "delete").into(),
            );
        }
        if credit_notes.count_approved_for_invoice(&mut tx, invoice_id).await? > 0 {
            return Err(
                CoreError::invalid_transition("Invoice", invoice_id, "credited", "delete").into(),
            );
        }

        let direction = invoice.direction;
        for item in invoices.items(&mut tx, invoice_id).await? {
            let key = resolve_key(&mut tx, tenant_id, &item.product_id, &invoice.location_id).await?;
            let reversal = -direction.invoice_stock_delta(item.quantity);
            let movement = movement_at(
                &key,
                direction.delete_movement_type(),
                reversal,
                Some(invoice_id),
                None,
                deleted_by,
            );
            post_delta(&mut tx, tenant_id, &key, reversal, &movement).await?;
        }

        let cancelled = credit_notes
            .cancel_drafts_for_invoice(&mut tx, invoice_id)
            .await?;
        let removed = payments.delete_single_for_invoice(&mut tx, invoice_id).await?;
        invoices.soft_delete(&mut tx, &invoice).await?;

        tx.commit().await?;

        info!(
            invoice_id,
            number = %invoice.invoice_number,
            cancelled_credit_notes = cancelled,
            removed_payments = removed,
            "Invoice deleted"
        );
        Ok(())
    }
}

fn build_item(invoice_id: &str, line: &NewInvoiceItem, now: chrono::DateTime<Utc>) -> InvoiceItem {
    InvoiceItem {
        id: new_id(),
        invoice_id: invoice_id.to_string(),
        product_id: line.product_id.clone(),
        quantity: line.quantity,
        unit_price: line.unit_price,
        discount_bps: line.discount_bps,
        total: line_total(line.quantity, line.unit_price, line.discount_bps),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use crate::pool::DbConfig;
    use mizan_core::{MovementFilter, PaymentStatus, Quantity};

    #[tokio::test]
    async fn test_sales_invoice_with_partial_payment() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, WAREHOUSE, 100).await;
        stock_up(&db, PRODUCT_B, WAREHOUSE, 10).await;

        let detail = db
            .invoices()
            .create(paid_with(
                new_invoice(
                    Direction::Sales,
                    CUSTOMER,
                    WAREHOUSE,
                    vec![item(PRODUCT_A, 10, 5), item(PRODUCT_B, 2, 20)],
                ),
                dollars(50),
            ))
            .await
            .unwrap();

        let invoice = &detail.invoice;
        assert_eq!(invoice.invoice_number, "SI-202610-00001");
        assert_eq!(invoice.total_amount, dollars(90));
        assert_eq!(invoice.paid_amount, dollars(50));
        assert_eq!(invoice.payment_status, PaymentStatus::Partial);
        assert_eq!(invoice.location_type, mizan_core::LocationType::Warehouse);

        assert_eq!(db.stock().get_stock(PRODUCT_A, WAREHOUSE).await.unwrap(), units(90));
        assert_eq!(db.stock().get_stock(PRODUCT_B, WAREHOUSE).await.unwrap(), units(8));

        let moves = db.stock().movements_for(&invoice.id).await.unwrap();
        assert_eq!(moves.len(), 2);
        assert!(moves.iter().all(|m| m.movement_type == MovementType::Sale));
        assert!(moves.iter().all(|m| m.quantity.is_negative()));

        assert_eq!(db.invoices().balance(&invoice.id).await.unwrap(), dollars(40));
        let payments = db.payments().list_payments(&invoice.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].allocation_type, AllocationType::Single);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_everything() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, STORE, 3).await;

        let err = db
            .invoices()
            .create(new_invoice(
                Direction::Sales,
                CUSTOMER,
                STORE,
                vec![item(PRODUCT_A, 2, 5), item(PRODUCT_A, 2, 5)],
            ))
            .await
            .unwrap_err();
        assert_eq!(
            err.as_core(),
            Some(&CoreError::InsufficientStock {
                product_id: PRODUCT_A.to_string(),
                available: units(3),
                required: units(4),
            })
        );

        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(3));
        let sales = db
            .invoices()
            .list(&InvoiceFilter {
                direction: Some(Direction::Sales),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(sales.is_empty());

        // The failed attempt did not consume a number.
        let detail = db
            .invoices()
            .create(new_invoice(Direction::Sales, CUSTOMER, STORE, vec![item(PRODUCT_A, 3, 5)]))
            .await
            .unwrap();
        assert_eq!(detail.invoice.invoice_number, "SI-202610-00001");
    }

    #[tokio::test]
    async fn test_sell_down_to_zero_then_refuse() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, WAREHOUSE, 10).await;

        db.invoices()
            .create(new_invoice(Direction::Sales, CUSTOMER, WAREHOUSE, vec![item(PRODUCT_A, 10, 5)]))
            .await
            .unwrap();
        assert!(db.stock().get_stock(PRODUCT_A, WAREHOUSE).await.unwrap().is_zero());

        let err = db
            .invoices()
            .create(new_invoice(Direction::Sales, CUSTOMER, WAREHOUSE, vec![item(PRODUCT_A, 1, 5)]))
            .await
            .unwrap_err();
        assert_eq!(
            err.as_core(),
            Some(&CoreError::InsufficientStock {
                product_id: PRODUCT_A.to_string(),
                available: Quantity::zero(),
                required: units(1),
            })
        );
    }

    #[tokio::test]
    async fn test_sale_from_empty_location_fails() {
        let db = ledger().await;
        let err = db
            .invoices()
            .create(new_invoice(Direction::Sales, CUSTOMER, VAN, vec![item(PRODUCT_A, 1, 5)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InsufficientStock { available, .. }) if available.is_zero()
        ));
    }

    #[tokio::test]
    async fn test_purchase_credits_stock() {
        let db = ledger().await;
        let detail = stock_up(&db, PRODUCT_B, VAN, 12).await;

        assert_eq!(detail.invoice.invoice_number, "PI-202610-00001");
        assert_eq!(detail.invoice.payment_status, PaymentStatus::Unpaid);
        assert_eq!(db.stock().get_stock(PRODUCT_B, VAN).await.unwrap(), units(12));

        let moves = db
            .stock()
            .movements(&MovementFilter {
                movement_type: Some(MovementType::Purchase),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].to_location_id.as_deref(), Some(VAN));
    }

    #[tokio::test]
    async fn test_payment_without_method_rejected() {
        let db = ledger().await;
        let mut request = new_invoice(Direction::Purchase, VENDOR, STORE, vec![item(PRODUCT_A, 1, 1)]);
        request.paid_amount = dollars(1);

        let result = db.invoices().create(request).await;
        assert!(matches!(result, Err(DbError::Core(CoreError::Validation(_)))));
    }

    #[tokio::test]
    async fn test_overpaid_creation_is_paid() {
        let db = ledger().await;
        let detail = db
            .invoices()
            .create(paid_with(
                new_invoice(Direction::Purchase, VENDOR, STORE, vec![item(PRODUCT_A, 1, 10)]),
                dollars(12),
            ))
            .await
            .unwrap();
        assert_eq!(detail.invoice.payment_status, PaymentStatus::Paid);
        assert_eq!(detail.invoice.paid_amount, dollars(12));
    }

    #[tokio::test]
    async fn test_update_item_quantity_applies_difference() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, STORE, 10).await;
        let detail = db
            .invoices()
            .create(new_invoice(Direction::Sales, CUSTOMER, STORE, vec![item(PRODUCT_A, 3, 4)]))
            .await
            .unwrap();

        let updated = db
            .invoices()
            .update_item(
                &detail.items[0].id,
                UpdateInvoiceItem {
                    product_id: PRODUCT_A.to_string(),
                    quantity: units(5),
                    unit_price: dollars(4),
                    discount_bps: 0,
                    updated_by: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.total, dollars(20));
        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(5));

        let invoice = db.invoices().get(&detail.invoice.id).await.unwrap().invoice;
        assert_eq!(invoice.total_amount, dollars(20));
        assert_eq!(invoice.version, detail.invoice.version + 1);
    }

    #[tokio::test]
    async fn test_update_item_product_change_reverses_old_product() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, STORE, 10).await;
        stock_up(&db, PRODUCT_B, STORE, 10).await;
        let detail = db
            .invoices()
            .create(new_invoice(Direction::Sales, CUSTOMER, STORE, vec![item(PRODUCT_A, 3, 4)]))
            .await
            .unwrap();

        db.invoices()
            .update_item(
                &detail.items[0].id,
                UpdateInvoiceItem {
                    product_id: PRODUCT_B.to_string(),
                    quantity: units(2),
                    unit_price: dollars(7),
                    discount_bps: 0,
                    updated_by: Some("editor".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(10));
        assert_eq!(db.stock().get_stock(PRODUCT_B, STORE).await.unwrap(), units(8));

        let moves = db.stock().movements_for(&detail.invoice.id).await.unwrap();
        let reversal = moves
            .iter()
            .find(|m| m.movement_type == MovementType::Adjustment)
            .unwrap();
        assert_eq!(reversal.product_id, PRODUCT_A);
        assert_eq!(reversal.quantity, units(3));

        let fetched = db.invoices().get(&detail.invoice.id).await.unwrap();
        assert_eq!(fetched.items[0].product_id, PRODUCT_B);
        assert_eq!(fetched.invoice.total_amount, dollars(14));
    }

    #[tokio::test]
    async fn test_add_item_refreshes_totals() {
        let db = ledger().await;
        let detail = stock_up(&db, PRODUCT_A, WAREHOUSE, 5).await;

        db.invoices()
            .add_item(&detail.invoice.id, item(PRODUCT_B, 4, 3))
            .await
            .unwrap();

        let invoice = db.invoices().get(&detail.invoice.id).await.unwrap();
        assert_eq!(invoice.items.len(), 2);
        assert_eq!(invoice.invoice.total_amount, dollars(17));
        assert_eq!(db.stock().get_stock(PRODUCT_B, WAREHOUSE).await.unwrap(), units(4));
    }

    #[tokio::test]
    async fn test_recalculate_totals_is_idempotent() {
        let db = ledger().await;
        let detail = stock_up(&db, PRODUCT_A, WAREHOUSE, 5).await;

        let first = db.invoices().recalculate_totals(&detail.invoice.id).await.unwrap();
        let second = db.invoices().recalculate_totals(&detail.invoice.id).await.unwrap();

        assert_eq!(first.total_amount, dollars(5));
        assert_eq!(first.version, detail.invoice.version);
        assert_eq!(second.version, first.version);
    }

    #[tokio::test]
    async fn test_delete_sales_invoice_restores_stock() {
        let db = ledger().await;
        stock_up(&db, PRODUCT_A, STORE, 10).await;
        let detail = db
            .invoices()
            .create(paid_with(
                new_invoice(Direction::Sales, CUSTOMER, STORE, vec![item(PRODUCT_A, 4, 5)]),
                dollars(5),
            ))
            .await
            .unwrap();
        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(6));

        db.invoices().delete(&detail.invoice.id, Some("manager")).await.unwrap();

        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(10));
        assert!(matches!(
            db.invoices().get(&detail.invoice.id).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(db.payments().list_payments(&detail.invoice.id).await.unwrap().is_empty());

        let moves = db.stock().movements_for(&detail.invoice.id).await.unwrap();
        assert!(moves
            .iter()
            .any(|m| m.movement_type == MovementType::SalesDelete && m.quantity == units(4)));
    }

    #[tokio::test]
    async fn test_delete_purchase_after_resale_fails() {
        let db = ledger().await;
        let purchase = stock_up(&db, PRODUCT_A, STORE, 5).await;
        db.invoices()
            .create(new_invoice(Direction::Sales, CUSTOMER, STORE, vec![item(PRODUCT_A, 4, 5)]))
            .await
            .unwrap();

        let err = db.invoices().delete(&purchase.invoice.id, None).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InsufficientStock { .. })));

        assert_eq!(db.stock().get_stock(PRODUCT_A, STORE).await.unwrap(), units(1));
        assert!(db.invoices().get(&purchase.invoice.id).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_never_oversell() {
        let path = std::env::temp_dir().join(format!("mizan-test-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(4))
            .await
            .unwrap();
        seed_master_data(&db).await;
        stock_up(&db, PRODUCT_A, STORE, 10).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.invoices()
                    .create(new_invoice(
                        Direction::Sales,
                        CUSTOMER,
                        STORE,
                        vec![item(PRODUCT_A, 1, 5)],
                    ))
                    .await
            }));
        }

        let mut sold = 0i64;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(err) => assert!(
                    matches!(err.as_core(), Some(CoreError::InsufficientStock { .. }))
                        || err.is_retryable(),
                    "unexpected error: {err}"
                ),
            }
        }

        let remaining = db.stock().get_stock(PRODUCT_A, STORE).await.unwrap();
        assert!(!remaining.is_negative());
        assert_eq!(remaining + Quantity::from_units(sold), units(10));

        let numbers: std::collections::HashSet<String> = db
            .invoices()
            .list(&InvoiceFilter {
                direction: Some(Direction::Sales),
                ..Default::default()
            })
            .await
            .unwrap()
            .into_iter()
            .map(|invoice| invoice.invoice_number)
            .collect();
        assert_eq!(numbers.len() as i64, sold);

        db.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
