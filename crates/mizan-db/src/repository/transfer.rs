//! # Transfer Repository

use sqlx::SqliteConnection;

use crate::error::DbResult;
use mizan_core::{Transfer, TransferItem};

#[derive(Debug, Clone, Copy)]
pub struct TransferRepository<'t> {
    tenant_id: &'t str,
}

impl<'t> TransferRepository<'t> {
    pub fn new(tenant_id: &'t str) -> Self {
        TransferRepository { tenant_id }
    }

    pub async fn insert(&self, conn: &mut SqliteConnection, transfer: &Transfer) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transfers (
                id, tenant_id, from_location_type, from_location_id,
                to_location_type, to_location_id, notes, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&transfer.id)
        .bind(self.tenant_id)
        .bind(transfer.from_location_type)
        .bind(&transfer.from_location_id)
        .bind(transfer.to_location_type)
        .bind(&transfer.to_location_id)
        .bind(&transfer.notes)
        .bind(&transfer.created_by)
        .bind(transfer.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(&self, conn: &mut SqliteConnection, item: &TransferItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transfer_items (id, transfer_id, product_id, quantity)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&item.id)
        .bind(&item.transfer_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn get(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Transfer>> {
        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, tenant_id, from_location_type, from_location_id,
                   to_location_type, to_location_id, notes, created_by, created_at
            FROM transfers
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(id)
        .bind(self.tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(transfer)
    }

    pub async fn items(
        &self,
        conn: &mut SqliteConnection,
        transfer_id: &str,
    ) -> DbResult<Vec<TransferItem>> {
        let items = sqlx::query_as::<_, TransferItem>(
            r#"
            SELECT id, transfer_id, product_id, quantity
            FROM transfer_items
            WHERE transfer_id = ?1
            ORDER BY id
            "#,
        )
        .bind(transfer_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(items)
    }

    /// Newest first. With a location, transfers touching it on either side.
    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        location_id: Option<&str>,
    ) -> DbResult<Vec<Transfer>> {
        let transfers = sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, tenant_id, from_location_type, from_location_id,
                   to_location_type, to_location_id, notes, created_by, created_at
            FROM transfers
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR from_location_id = ?2 OR to_location_id = ?2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(self.tenant_id)
        .bind(location_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(transfers)
    }
}
