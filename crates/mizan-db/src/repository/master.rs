//! # Master Data Repository
//!
//! Locations and products. The ledger only reads these, apart from the
//! minimal writers used for seeding and tests.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use mizan_core::{Location, Product};

#[derive(Debug, Clone, Copy)]
pub struct MasterRepository<'t> {
    tenant_id: &'t str,
}

impl<'t> MasterRepository<'t> {
    pub fn new(tenant_id: &'t str) -> Self {
        MasterRepository { tenant_id }
    }

    pub async fn insert_location(
        &self,
        conn: &mut SqliteConnection,
        location: &Location,
    ) -> DbResult<()> {
        debug!(id = %location.id, location_type = %location.location_type, "Inserting location");

        sqlx::query(
            r#"
            INSERT INTO locations (id, tenant_id, name, location_type, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&location.id)
        .bind(self.tenant_id)
        .bind(&location.name)
        .bind(location.location_type)
        .bind(location.is_active)
        .bind(location.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Active location by id.
    pub async fn get_location(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Location>> {
        let location = sqlx::query_as::<_, Location>(
            r#"
            SELECT id, tenant_id, name, location_type, is_active, created_at
            FROM locations
            WHERE id = ?1 AND tenant_id = ?2 AND is_active = 1
            "#,
        )
        .bind(id)
        .bind(self.tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(location)
    }

    pub async fn list_locations(&self, conn: &mut SqliteConnection) -> DbResult<Vec<Location>> {
        let locations = sqlx::query_as::<_, Location>(
            r#"
            SELECT id, tenant_id, name, location_type, is_active, created_at
            FROM locations
            WHERE tenant_id = ?1 AND is_active = 1
            ORDER BY name
            "#,
        )
        .bind(self.tenant_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(locations)
    }

    pub async fn insert_product(
        &self,
        conn: &mut SqliteConnection,
        product: &Product,
    ) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, tenant_id, sku, name, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&product.id)
        .bind(self.tenant_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Active product by id.
    pub async fn get_product(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, tenant_id, sku, name, is_active, created_at
            FROM products
            WHERE id = ?1 AND tenant_id = ?2 AND is_active = 1
            "#,
        )
        .bind(id)
        .bind(self.tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(product)
    }
}
