//! # Transfer Engine
//!
//! Moves goods between two locations in one transaction.
//!
//! ```text
//! NewTransfer { from: W1, to: V7, [P × 20] }
//!      │
//!      ├── validate (distinct locations, positive quantities)
//!      ├── aggregate duplicate lines per product
//!      ├── pre-check every product at W1        ── InsufficientStock?
//!      │                                             → nothing written
//!      ▼
//!  transfers + transfer_items
//!  for each line:  stock(P, W1) −= q
//!                  stock(P, V7) += q
//!                  movement(transfer, from W1, to V7, +q)
//! ```
//!
//! Σ stock over all locations is unchanged by a transfer.

use std::collections::HashMap;

use chrono::Utc;
use tracing::info;

use mizan_core::credit::quantities_by_product;
use mizan_core::validation::validate_transfer;
use mizan_core::{
    new_id, MovementType, NewMovement, NewTransfer, StockKey, Transfer, TransferDetail,
    TransferItem,
};

use crate::engine::stock::{apply_delta, ensure_available, require_product};
use crate::engine::{require_location, retry_once};
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::{MovementRepository, TransferRepository};

#[derive(Debug, Clone)]
pub struct TransferEngine {
    db: Database,
}

impl TransferEngine {
    pub(crate) fn new(db: Database) -> Self {
        TransferEngine { db }
    }

    /// Executes a transfer. All lines move or none do.
    pub async fn transfer(&self, input: NewTransfer) -> DbResult<TransferDetail> {
        validate_transfer(&input)?;
        retry_once("transfer", || self.transfer_once(&input)).await
    }

    async fn transfer_once(&self, input: &NewTransfer) -> DbResult<TransferDetail> {
        let tenant_id = self.db.tenant_id();
        let mut tx = self.db.begin_immediate().await?;

        let from = require_location(&mut tx, tenant_id, &input.from_location_id).await?;
        let to = require_location(&mut tx, tenant_id, &input.to_location_id).await?;

        let lines = quantities_by_product(
            input
                .items
                .iter()
                .map(|line| (line.product_id.as_str(), line.quantity)),
        );

        let mut source_keys = HashMap::with_capacity(lines.len());
        for (product_id, _) in &lines {
            require_product(&mut tx, tenant_id, product_id).await?;
            source_keys.insert(
                product_id.clone(),
                StockKey {
                    product_id: product_id.clone(),
                    location_type: from.location_type,
                    location_id: from.id.clone(),
                },
            );
        }
        ensure_available(&mut tx, tenant_id, &source_keys, &lines).await?;

        let transfer = Transfer {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            from_location_type: from.location_type,
            from_location_id: from.id.clone(),
            to_location_type: to.location_type,
            to_location_id: to.id.clone(),
            notes: input.notes.clone(),
            created_by: input.created_by.clone(),
            created_at: Utc::now(),
        };

        let transfers = TransferRepository::new(tenant_id);
        let movements = MovementRepository::new(tenant_id);
        transfers.insert(&mut tx, &transfer).await?;

        let mut items = Vec::with_capacity(lines.len());
        for (product_id, quantity) in lines {
            let item = TransferItem {
                id: new_id(),
                transfer_id: transfer.id.clone(),
                product_id: product_id.clone(),
                quantity,
            };
            transfers.insert_item(&mut tx, &item).await?;

            let Some(source) = source_keys.get(&product_id) else {
                return Err(DbError::Internal(format!("no source key for {}", product_id)));
            };
            let destination = StockKey {
                product_id: product_id.clone(),
                location_type: to.location_type,
                location_id: to.id.clone(),
            };

            apply_delta(&mut tx, tenant_id, source, -quantity).await?;
            apply_delta(&mut tx, tenant_id, &destination, quantity).await?;

            movements
                .append(
                    &mut tx,
                    &NewMovement {
                        product_id,
                        movement_type: MovementType::Transfer,
                        quantity,
                        from_location_type: Some(from.location_type),
                        from_location_id: Some(from.id.clone()),
                        to_location_type: Some(to.location_type),
                        to_location_id: Some(to.id.clone()),
                        reference_id: Some(transfer.id.clone()),
                        notes: input.notes.clone(),
                        created_by: input.created_by.clone(),
                    },
                )
                .await?;

            items.push(item);
        }

        tx.commit().await?;

        info!(
            transfer_id = %transfer.id,
            from = %from.id,
            to = %to.id,
            lines = items.len(),
            "Transfer completed"
        );

        Ok(TransferDetail { transfer, items })
    }

    pub async fn get_transfer(&self, id: &str) -> DbResult<TransferDetail> {
        let repo = TransferRepository::new(self.db.tenant_id());
        let mut conn = self.db.pool().acquire().await?;

        let transfer = repo
            .get(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Transfer", id))?;
        let items = repo.items(&mut conn, id).await?;

        Ok(TransferDetail { transfer, items })
    }

    /// Newest first; with a location, only transfers touching it.
    pub async fn list_transfers(&self, location_id: Option<&str>) -> DbResult<Vec<Transfer>> {
        let mut conn = self.db.pool().acquire().await?;
        TransferRepository::new(self.db.tenant_id())
            .list(&mut conn, location_id)
            .await
    }
}
