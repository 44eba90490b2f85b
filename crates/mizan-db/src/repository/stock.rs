//! # Stock Repository
//!
//! Quantity on hand per `(product, location_type, location_id)`.
//!
//! ## Atomic Adjustments
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Check-and-adjust in ONE statement                    │
//! │                                                                         │
//! │  delta >= 0 (credit)                                                   │
//! │    INSERT .. ON CONFLICT (tenant, product, type, location)             │
//! │    DO UPDATE SET quantity = quantity + excluded.quantity               │
//! │    RETURNING quantity                       → row created on first use │
//! │                                                                         │
//! │  delta < 0 (debit)                                                     │
//! │    UPDATE stocks SET quantity = quantity + ?delta                      │
//! │    WHERE .. AND quantity + ?delta >= 0                                 │
//! │    RETURNING quantity                       → no row = not enough      │
//! │                                                                         │
//! │  Two concurrent sales can never both pass: the condition is evaluated  │
//! │  by SQLite against the committed quantity under the write lock.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use mizan_core::{new_id, ProductStockSummary, Quantity, StockKey, StockLevel};

#[derive(Debug, Clone, Copy)]
pub struct StockRepository<'t> {
    tenant_id: &'t str,
}

impl<'t> StockRepository<'t> {
    pub fn new(tenant_id: &'t str) -> Self {
        StockRepository { tenant_id }
    }

    pub async fn get(
        &self,
        conn: &mut SqliteConnection,
        key: &StockKey,
    ) -> DbResult<Option<StockLevel>> {
        let level = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT id, tenant_id, product_id, location_type, location_id, quantity, updated_at
            FROM stocks
            WHERE tenant_id = ?1 AND product_id = ?2 AND location_type = ?3 AND location_id = ?4
            "#,
        )
        .bind(self.tenant_id)
        .bind(&key.product_id)
        .bind(key.location_type)
        .bind(&key.location_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(level)
    }

    /// Quantity on hand; a missing row counts as zero.
    pub async fn quantity(&self, conn: &mut SqliteConnection, key: &StockKey) -> DbResult<Quantity> {
        Ok(self
            .get(conn, key)
            .await?
            .map(|level| level.quantity)
            .unwrap_or_default())
    }

    /// Applies a signed delta.
    ///
    /// ## Returns
    /// * `Some(quantity)` - the new quantity
    /// * `None` - a debit that would take the row below zero (or a debit
    ///   against a row that does not exist); nothing was written
    pub async fn apply_delta(
        &self,
        conn: &mut SqliteConnection,
        key: &StockKey,
        delta: Quantity,
    ) -> DbResult<Option<Quantity>> {
        debug!(
            product_id = %key.product_id,
            location_id = %key.location_id,
            location_type = %key.location_type,
            delta = %delta,
            "Applying stock delta"
        );

        let now = Utc::now();

        if delta.is_negative() {
            let quantity = sqlx::query_scalar::<_, Quantity>(
                r#"
                UPDATE stocks
                SET quantity = quantity + ?1, updated_at = ?2
                WHERE tenant_id = ?3 AND product_id = ?4 AND location_type = ?5 AND location_id = ?6
                  AND quantity + ?1 >= 0
                RETURNING quantity
                "#,
            )
            .bind(delta)
            .bind(now)
            .bind(self.tenant_id)
            .bind(&key.product_id)
            .bind(key.location_type)
            .bind(&key.location_id)
            .fetch_optional(&mut *conn)
            .await?;

            return Ok(quantity);
        }

        let quantity = sqlx::query_scalar::<_, Quantity>(
            r#"
            INSERT INTO stocks (id, tenant_id, product_id, location_type, location_id, quantity, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (tenant_id, product_id, location_type, location_id)
            DO UPDATE SET quantity = quantity + excluded.quantity, updated_at = excluded.updated_at
            RETURNING quantity
            "#,
        )
        .bind(new_id())
        .bind(self.tenant_id)
        .bind(&key.product_id)
        .bind(key.location_type)
        .bind(&key.location_id)
        .bind(delta)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Ok(Some(quantity))
    }

    /// Overwrites the quantity, creating the row if needed.
    ///
    /// ## Returns
    /// The quantity held before the write.
    pub async fn set(
        &self,
        conn: &mut SqliteConnection,
        key: &StockKey,
        quantity: Quantity,
    ) -> DbResult<Quantity> {
        let previous = self.quantity(conn, key).await?;

        sqlx::query(
            r#"
            INSERT INTO stocks (id, tenant_id, product_id, location_type, location_id, quantity, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (tenant_id, product_id, location_type, location_id)
            DO UPDATE SET quantity = excluded.quantity, updated_at = excluded.updated_at
            "#,
        )
        .bind(new_id())
        .bind(self.tenant_id)
        .bind(&key.product_id)
        .bind(key.location_type)
        .bind(&key.location_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(previous)
    }

    /// Every stock row at a location.
    pub async fn list_by_location(
        &self,
        conn: &mut SqliteConnection,
        location_id: &str,
    ) -> DbResult<Vec<StockLevel>> {
        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT id, tenant_id, product_id, location_type, location_id, quantity, updated_at
            FROM stocks
            WHERE tenant_id = ?1 AND location_id = ?2
            ORDER BY product_id
            "#,
        )
        .bind(self.tenant_id)
        .bind(location_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(levels)
    }

    /// Every stock row for a product.
    pub async fn list_by_product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Vec<StockLevel>> {
        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT id, tenant_id, product_id, location_type, location_id, quantity, updated_at
            FROM stocks
            WHERE tenant_id = ?1 AND product_id = ?2
            ORDER BY location_type, location_id
            "#,
        )
        .bind(self.tenant_id)
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(levels)
    }

    /// Total quantity per product across all locations.
    pub async fn summary(&self, conn: &mut SqliteConnection) -> DbResult<Vec<ProductStockSummary>> {
        let rows = sqlx::query_as::<_, ProductStockSummary>(
            r#"
            SELECT product_id,
                   COALESCE(SUM(quantity), 0) AS total_quantity,
                   COUNT(*) AS location_count
            FROM stocks
            WHERE tenant_id = ?1
            GROUP BY product_id
            ORDER BY product_id
            "#,
        )
        .bind(self.tenant_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}
