//! # Stock Ledger
//!
//! The authoritative quantity per `(product, location_type, location_id)`
//! and the append-only movement log.
//!
//! ## Posting a Delta
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  post_delta(conn, key, delta, movement)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StockRepository::apply_delta  (conditional UPDATE / upsert)           │
//! │       │                                                                 │
//! │       ├── None → re-read quantity → InsufficientStock{avail, required} │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  MovementRepository::append    (same transaction)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every engine that moves goods goes through [`post_delta`]; no other code
//! writes the `stocks` table.
//!
//! Location types are never taken from callers. [`resolve_key`] reads the
//! type from the location master record, so a van's stock can only ever be
//! booked under `van`.

use std::collections::HashMap;

use sqlx::SqliteConnection;
use tracing::{debug, info};

use mizan_core::validation::{validate_id, validate_quantity};
use mizan_core::{
    CoreError, LocationType, MovementFilter, MovementType, NewMovement, ProductStockSummary,
    Quantity, StockKey, StockLevel, StockMovement,
};

use crate::engine::{require_location, retry_once};
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::{MasterRepository, MovementRepository, StockRepository};

// =============================================================================
// Shared Posting Primitives
// =============================================================================

/// Builds the stock key for a product at a location, checking both exist.
pub(crate) async fn resolve_key(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    product_id: &str,
    location_id: &str,
) -> DbResult<StockKey> {
    let location = require_location(conn, tenant_id, location_id).await?;
    require_product(conn, tenant_id, product_id).await?;

    Ok(StockKey {
        product_id: product_id.to_string(),
        location_type: location.location_type,
        location_id: location.id,
    })
}

pub(crate) async fn require_product(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    product_id: &str,
) -> DbResult<()> {
    MasterRepository::new(tenant_id)
        .get_product(conn, product_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| DbError::not_found("Product", product_id))
}

/// Applies `delta` to `key`, failing with `InsufficientStock` instead of
/// going below zero.
pub(crate) async fn apply_delta(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    key: &StockKey,
    delta: Quantity,
) -> DbResult<Quantity> {
    let repo = StockRepository::new(tenant_id);

    match repo.apply_delta(conn, key, delta).await? {
        Some(quantity) => Ok(quantity),
        None => {
            let available = repo.quantity(conn, key).await?;
            Err(CoreError::InsufficientStock {
                product_id: key.product_id.clone(),
                available,
                required: -delta,
            }
            .into())
        }
    }
}

/// Applies `delta` and records `movement` in the same transaction.
pub(crate) async fn post_delta(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    key: &StockKey,
    delta: Quantity,
    movement: &NewMovement,
) -> DbResult<Quantity> {
    let quantity = apply_delta(conn, tenant_id, key, delta).await?;
    MovementRepository::new(tenant_id)
        .append(conn, movement)
        .await?;
    Ok(quantity)
}

/// Fails with `InsufficientStock` for the first product whose requirement
/// exceeds what `location` holds. Writes nothing.
pub(crate) async fn ensure_available(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    keys: &HashMap<String, StockKey>,
    required: &[(String, Quantity)],
) -> DbResult<()> {
    let repo = StockRepository::new(tenant_id);

    for (product_id, quantity) in required {
        let Some(key) = keys.get(product_id) else {
            return Err(DbError::not_found("Product", product_id.as_str()));
        };
        let available = repo.quantity(conn, key).await?;
        if available < *quantity {
            return Err(CoreError::InsufficientStock {
                product_id: product_id.clone(),
                available,
                required: *quantity,
            }
            .into());
        }
    }

    Ok(())
}

/// Movement touching a single location: outbound deltas fill the `from`
/// side, inbound deltas the `to` side.
pub(crate) fn movement_at(
    key: &StockKey,
    movement_type: MovementType,
    delta: Quantity,
    reference_id: Option<&str>,
    notes: Option<&str>,
    created_by: Option<&str>,
) -> NewMovement {
    let (from, to) = if delta.is_negative() {
        (Some(key), None)
    } else {
        (None, Some(key))
    };

    NewMovement {
        product_id: key.product_id.clone(),
        movement_type,
        quantity: delta,
        from_location_type: from.map(|k| k.location_type),
        from_location_id: from.map(|k| k.location_id.clone()),
        to_location_type: to.map(|k| k.location_type),
        to_location_id: to.map(|k| k.location_id.clone()),
        reference_id: reference_id.map(str::to_string),
        notes: notes.map(str::to_string),
        created_by: created_by.map(str::to_string),
    }
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Public face of the stock half of the ledger.
#[derive(Debug, Clone)]
pub struct StockLedger {
    db: Database,
}

impl StockLedger {
    pub(crate) fn new(db: Database) -> Self {
        StockLedger { db }
    }

    /// Canonical type of a location. Unknown or inactive is `NotFound`.
    pub async fn get_location_type(&self, location_id: &str) -> DbResult<LocationType> {
        let mut conn = self.db.pool().acquire().await?;
        let location = require_location(&mut conn, self.db.tenant_id(), location_id).await?;
        Ok(location.location_type)
    }

    /// Quantity of a product at a location.
    ///
    /// ## Returns
    /// * `Ok(quantity)` - the row exists (it may hold zero)
    /// * `Err(NotFound)` - nothing was ever moved into this location
    pub async fn get_stock(&self, product_id: &str, location_id: &str) -> DbResult<Quantity> {
        Ok(self.stock_level(product_id, location_id).await?.quantity)
    }

    pub async fn stock_level(&self, product_id: &str, location_id: &str) -> DbResult<StockLevel> {
        let tenant_id = self.db.tenant_id();
        let mut conn = self.db.pool().acquire().await?;
        let key = resolve_key(&mut conn, tenant_id, product_id, location_id).await?;

        StockRepository::new(tenant_id)
            .get(&mut conn, &key)
            .await?
            .ok_or_else(|| DbError::not_found("Stock", format!("{}@{}", product_id, location_id)))
    }

    /// Applies a signed manual correction, recorded as an `adjustment`.
    ///
    /// A negative delta larger than the quantity on hand fails with
    /// `InsufficientStock` and writes nothing.
    pub async fn adjust_stock(
        &self,
        product_id: &str,
        location_id: &str,
        delta: Quantity,
        notes: Option<&str>,
        created_by: Option<&str>,
    ) -> DbResult<Quantity> {
        validate_id("product_id", product_id)?;
        validate_id("location_id", location_id)?;

        retry_once("adjust_stock", || {
            self.adjust_once(product_id, location_id, delta, notes, created_by)
        })
        .await
    }

    async fn adjust_once(
        &self,
        product_id: &str,
        location_id: &str,
        delta: Quantity,
        notes: Option<&str>,
        created_by: Option<&str>,
    ) -> DbResult<Quantity> {
        let tenant_id = self.db.tenant_id();
        let mut tx = self.db.begin_immediate().await?;

        let key = resolve_key(&mut tx, tenant_id, product_id, location_id).await?;
        let movement = movement_at(&key, MovementType::Adjustment, delta, None, notes, created_by);
        let quantity = post_delta(&mut tx, tenant_id, &key, delta, &movement).await?;

        tx.commit().await?;

        debug!(product_id, location_id, delta = %delta, quantity = %quantity, "Stock adjusted");
        Ok(quantity)
    }

    /// Positive manual increment.
    pub async fn add_stock(
        &self,
        product_id: &str,
        location_id: &str,
        quantity: Quantity,
        notes: Option<&str>,
        created_by: Option<&str>,
    ) -> DbResult<Quantity> {
        validate_quantity("quantity", quantity)?;
        self.adjust_stock(product_id, location_id, quantity, notes, created_by)
            .await
    }

    /// Overwrites the quantity, recording the signed difference as an
    /// `adjustment` movement.
    pub async fn set_stock(
        &self,
        product_id: &str,
        location_id: &str,
        quantity: Quantity,
        notes: Option<&str>,
        created_by: Option<&str>,
    ) -> DbResult<Quantity> {
        validate_id("product_id", product_id)?;
        validate_id("location_id", location_id)?;
        if quantity.is_negative() {
            return Err(mizan_core::ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        retry_once("set_stock", || {
            self.set_once(product_id, location_id, quantity, notes, created_by)
        })
        .await
    }

    async fn set_once(
        &self,
        product_id: &str,
        location_id: &str,
        quantity: Quantity,
        notes: Option<&str>,
        created_by: Option<&str>,
    ) -> DbResult<Quantity> {
        let tenant_id = self.db.tenant_id();
        let mut tx = self.db.begin_immediate().await?;

        let key = resolve_key(&mut tx, tenant_id, product_id, location_id).await?;
        let previous = StockRepository::new(tenant_id)
            .set(&mut tx, &key, quantity)
            .await?;

        let difference = quantity - previous;
        if !difference.is_zero() {
            let movement = movement_at(
                &key,
                MovementType::Adjustment,
                difference,
                None,
                notes,
                created_by,
            );
            MovementRepository::new(tenant_id)
                .append(&mut tx, &movement)
                .await?;
        }

        tx.commit().await?;

        info!(product_id, location_id, previous = %previous, quantity = %quantity, "Stock set");
        Ok(quantity)
    }

    /// Appends a movement without touching any quantity.
    pub async fn record_movement(&self, movement: NewMovement) -> DbResult<StockMovement> {
        validate_id("product_id", &movement.product_id)?;

        let mut conn = self.db.pool().acquire().await?;
        MovementRepository::new(self.db.tenant_id())
            .append(&mut conn, &movement)
            .await
    }

    /// Every stock row at a location.
    pub async fn location_stock(&self, location_id: &str) -> DbResult<Vec<StockLevel>> {
        let mut conn = self.db.pool().acquire().await?;
        require_location(&mut conn, self.db.tenant_id(), location_id).await?;
        StockRepository::new(self.db.tenant_id())
            .list_by_location(&mut conn, location_id)
            .await
    }

    /// Every stock row for a product.
    pub async fn product_stock(&self, product_id: &str) -> DbResult<Vec<StockLevel>> {
        let mut conn = self.db.pool().acquire().await?;
        StockRepository::new(self.db.tenant_id())
            .list_by_product(&mut conn, product_id)
            .await
    }

    /// Total quantity per product across all locations.
    pub async fn inventory_summary(&self) -> DbResult<Vec<ProductStockSummary>> {
        let mut conn = self.db.pool().acquire().await?;
        StockRepository::new(self.db.tenant_id())
            .summary(&mut conn)
            .await
    }

    /// Movement history, newest first.
    pub async fn movements(&self, filter: &MovementFilter) -> DbResult<Vec<StockMovement>> {
        let mut conn = self.db.pool().acquire().await?;
        MovementRepository::new(self.db.tenant_id())
            .list(
                &mut conn,
                filter,
                self.db.settings().movements.default_limit,
            )
            .await
    }

    /// Movements written for one document.
    pub async fn movements_for(&self, reference_id: &str) -> DbResult<Vec<StockMovement>> {
        let mut conn = self.db.pool().acquire().await?;
        MovementRepository::new(self.db.tenant_id())
            .list_by_reference(&mut conn, reference_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;

    #[tokio::test]
    async fn test_location_type_comes_from_master_record() {
        let db = ledger().await;
        let stock = db.stock();

        assert_eq!(stock.get_location_type(VAN).await.unwrap(), LocationType::Van);
        assert_eq!(
            stock.get_location_type(WAREHOUSE).await.unwrap(),
            LocationType::Warehouse
        );
        assert!(matches!(
            stock.get_location_type("loc-nowhere").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rows_are_partitioned_by_location_type() {
        let db = ledger().await;
        let stock = db.stock();

        stock.add_stock(PRODUCT_A, VAN, units(4), None, None).await.unwrap();
        stock.add_stock(PRODUCT_A, STORE, units(9), None, None).await.unwrap();

        let van = stock.stock_level(PRODUCT_A, VAN).await.unwrap();
        assert_eq!(van.location_type, LocationType::Van);
        assert_eq!(van.quantity, units(4));

        let store = stock.stock_level(PRODUCT_A, STORE).await.unwrap();
        assert_eq!(store.location_type, LocationType::Store);
        assert_eq!(store.quantity, units(9));

        // No warehouse row was ever created.
        assert!(matches!(
            stock.get_stock(PRODUCT_A, WAREHOUSE).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_negative_adjustment_cannot_go_below_zero() {
        let db = ledger().await;
        let stock = db.stock();
        stock.add_stock(PRODUCT_A, WAREHOUSE, units(3), None, None).await.unwrap();

        let err = stock
            .adjust_stock(PRODUCT_A, WAREHOUSE, -units(5), Some("count"), None)
            .await
            .unwrap_err();
        assert_eq!(
            err.as_core(),
            Some(&CoreError::InsufficientStock {
                product_id: PRODUCT_A.to_string(),
                available: units(3),
                required: units(5),
            })
        );
        assert_eq!(stock.get_stock(PRODUCT_A, WAREHOUSE).await.unwrap(), units(3));

        let qty = stock
            .adjust_stock(PRODUCT_A, WAREHOUSE, -units(3), None, None)
            .await
            .unwrap();
        assert!(qty.is_zero());
    }

    #[tokio::test]
    async fn test_set_stock_records_signed_difference() {
        let db = ledger().await;
        let stock = db.stock();
        stock.add_stock(PRODUCT_B, STORE, units(10), None, None).await.unwrap();

        stock.set_stock(PRODUCT_B, STORE, units(7), Some("recount"), Some("auditor")).await.unwrap();
        assert_eq!(stock.get_stock(PRODUCT_B, STORE).await.unwrap(), units(7));

        let history = stock
            .movements(&MovementFilter {
                product_id: Some(PRODUCT_B.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        // Newest first.
        assert_eq!(history[0].movement_type, MovementType::Adjustment);
        assert_eq!(history[0].quantity, -units(3));
        assert_eq!(history[0].from_location_id.as_deref(), Some(STORE));
        assert_eq!(history[1].quantity, units(10));
    }

    #[tokio::test]
    async fn test_set_stock_rejects_negative() {
        let db = ledger().await;
        let result = db.stock().set_stock(PRODUCT_A, STORE, -units(1), None, None).await;
        assert!(matches!(result, Err(DbError::Core(CoreError::Validation(_)))));
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let db = ledger().await;
        let result = db.stock().add_stock("ghost", STORE, units(1), None, None).await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_inventory_summary_and_location_listing() {
        let db = ledger().await;
        let stock = db.stock();
        stock.add_stock(PRODUCT_A, WAREHOUSE, units(5), None, None).await.unwrap();
        stock.add_stock(PRODUCT_A, VAN, units(2), None, None).await.unwrap();
        stock.add_stock(PRODUCT_B, VAN, units(1), None, None).await.unwrap();

        let summary = stock.inventory_summary().await.unwrap();
        let a = summary.iter().find(|s| s.product_id == PRODUCT_A).unwrap();
        assert_eq!(a.total_quantity, units(7));
        assert_eq!(a.location_count, 2);

        let van = stock.location_stock(VAN).await.unwrap();
        assert_eq!(van.len(), 2);

        let filtered = stock
            .movements(&MovementFilter {
                location_id: Some(VAN.to_string()),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn test_record_movement_is_append_only() {
        let db = ledger().await;
        let movement = db
            .stock()
            .record_movement(NewMovement {
                product_id: PRODUCT_A.to_string(),
                movement_type: MovementType::Adjustment,
                quantity: units(1),
                from_location_type: None,
                from_location_id: None,
                to_location_type: Some(LocationType::Store),
                to_location_id: Some(STORE.to_string()),
                reference_id: None,
                notes: Some("audit note".to_string()),
                created_by: None,
            })
            .await
            .unwrap();

        let result = sqlx::query("DELETE FROM stock_movements WHERE id = ?1")
            .bind(&movement.id)
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }
}
