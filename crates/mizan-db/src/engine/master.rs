//! # Master Data
//!
//! Read-only lookups the ledger depends on (`GetProduct`, location type
//! resolution) and the minimal writers the seed binary and tests use.
//! Full master-data management lives outside this crate.

use chrono::Utc;
use tracing::info;

use mizan_core::validation::validate_id;
use mizan_core::{Location, LocationType, Product};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::MasterRepository;

#[derive(Debug, Clone)]
pub struct MasterData {
    db: Database,
}

impl MasterData {
    pub(crate) fn new(db: Database) -> Self {
        MasterData { db }
    }

    pub async fn register_location(
        &self,
        id: &str,
        name: &str,
        location_type: LocationType,
    ) -> DbResult<Location> {
        validate_id("id", id)?;
        validate_id("name", name)?;

        let location = Location {
            id: id.to_string(),
            tenant_id: self.db.tenant_id().to_string(),
            name: name.to_string(),
            location_type,
            is_active: true,
            created_at: Utc::now(),
        };

        let mut conn = self.db.pool().acquire().await?;
        MasterRepository::new(self.db.tenant_id())
            .insert_location(&mut conn, &location)
            .await?;

        info!(id, location_type = %location_type, "Location registered");
        Ok(location)
    }

    pub async fn register_product(&self, id: &str, sku: &str, name: &str) -> DbResult<Product> {
        validate_id("id", id)?;
        validate_id("sku", sku)?;

        let product = Product {
            id: id.to_string(),
            tenant_id: self.db.tenant_id().to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };

        let mut conn = self.db.pool().acquire().await?;
        MasterRepository::new(self.db.tenant_id())
            .insert_product(&mut conn, &product)
            .await?;

        info!(id, sku, "Product registered");
        Ok(product)
    }

    pub async fn get_location(&self, id: &str) -> DbResult<Location> {
        let mut conn = self.db.pool().acquire().await?;
        MasterRepository::new(self.db.tenant_id())
            .get_location(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Location", id))
    }

    pub async fn get_product(&self, id: &str) -> DbResult<Product> {
        let mut conn = self.db.pool().acquire().await?;
        MasterRepository::new(self.db.tenant_id())
            .get_product(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    pub async fn list_locations(&self) -> DbResult<Vec<Location>> {
        let mut conn = self.db.pool().acquire().await?;
        MasterRepository::new(self.db.tenant_id())
            .list_locations(&mut conn)
            .await
    }
}
