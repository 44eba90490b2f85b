//! # Movement Repository
//!
//! The append-only stock movement log. Rows are only ever inserted; the
//! schema's triggers reject UPDATE and DELETE.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use mizan_core::{new_id, MovementFilter, NewMovement, StockMovement};

#[derive(Debug, Clone, Copy)]
pub struct MovementRepository<'t> {
    tenant_id: &'t str,
}

impl<'t> MovementRepository<'t> {
    pub fn new(tenant_id: &'t str) -> Self {
        MovementRepository { tenant_id }
    }

    /// Appends one movement and returns the stored row.
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        movement: &NewMovement,
    ) -> DbResult<StockMovement> {
        let row = StockMovement {
            id: new_id(),
            tenant_id: self.tenant_id.to_string(),
            product_id: movement.product_id.clone(),
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            from_location_type: movement.from_location_type,
            from_location_id: movement.from_location_id.clone(),
            to_location_type: movement.to_location_type,
            to_location_id: movement.to_location_id.clone(),
            reference_id: movement.reference_id.clone(),
            notes: movement.notes.clone(),
            created_by: movement.created_by.clone(),
            created_at: Utc::now(),
        };

        debug!(
            id = %row.id,
            product_id = %row.product_id,
            movement_type = row.movement_type.as_str(),
            quantity = %row.quantity,
            "Recording stock movement"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, tenant_id, product_id, movement_type, quantity,
                from_location_type, from_location_id, to_location_type, to_location_id,
                reference_id, notes, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&row.id)
        .bind(&row.tenant_id)
        .bind(&row.product_id)
        .bind(row.movement_type)
        .bind(row.quantity)
        .bind(row.from_location_type)
        .bind(&row.from_location_id)
        .bind(row.to_location_type)
        .bind(&row.to_location_id)
        .bind(&row.reference_id)
        .bind(&row.notes)
        .bind(&row.created_by)
        .bind(row.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Movement history, newest first.
    ///
    /// `location_id` matches either endpoint. Unset filter fields match
    /// everything.
    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        filter: &MovementFilter,
        default_limit: u32,
    ) -> DbResult<Vec<StockMovement>> {
        let limit = filter.limit.unwrap_or(default_limit);

        let rows = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, tenant_id, product_id, movement_type, quantity,
                   from_location_type, from_location_id, to_location_type, to_location_id,
                   reference_id, notes, created_by, created_at
            FROM stock_movements
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR product_id = ?2)
              AND (?3 IS NULL OR movement_type = ?3)
              AND (?4 IS NULL OR from_location_id = ?4 OR to_location_id = ?4)
              AND (?5 IS NULL OR created_at >= ?5)
              AND (?6 IS NULL OR created_at <= ?6)
            ORDER BY created_at DESC, id DESC
            LIMIT ?7
            "#,
        )
        .bind(self.tenant_id)
        .bind(filter.product_id.as_deref())
        .bind(filter.movement_type)
        .bind(filter.location_id.as_deref())
        .bind(filter.from)
        .bind(filter.to)
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    /// Movements written for one document (invoice, transfer, credit note).
    pub async fn list_by_reference(
        &self,
        conn: &mut SqliteConnection,
        reference_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, tenant_id, product_id, movement_type, quantity,
                   from_location_type, from_location_id, to_location_type, to_location_id,
                   reference_id, notes, created_by, created_at
            FROM stock_movements
            WHERE tenant_id = ?1 AND reference_id = ?2
            ORDER BY created_at, id
            "#,
        )
        .bind(self.tenant_id)
        .bind(reference_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}
