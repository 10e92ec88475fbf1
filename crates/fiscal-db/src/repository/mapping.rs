//! # Catalog Mapping Repository
//!
//! Commerce product/variant → fiscal item/variant associations. Mappings are
//! created by the merchant's admin workflow; the pipeline reads them and
//! only writes the stock sync bookkeeping columns.
//!
//! ## Lookup Precedence
//! ```text
//! line (product 7, variant 70)
//!   │
//!   ├── mapping (7, 70)     ◄── exact variant match wins
//!   └── mapping (7, NULL)   ◄── product-level fallback
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use fiscal_core::CatalogMapping;

/// Repository for catalog mapping operations.
#[derive(Debug, Clone)]
pub struct MappingRepository {
    pool: SqlitePool,
}

impl MappingRepository {
    /// Creates a new MappingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MappingRepository { pool }
    }

    /// Inserts a mapping.
    ///
    /// ## Errors
    /// - [`DbError::UniqueViolation`] if (shop, product, variant) is taken
    pub async fn insert(&self, mapping: &CatalogMapping) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO catalog_mappings (
                id, shop_id, commerce_product_id, commerce_variant_id,
                commerce_inventory_item_id, commerce_sku,
                fiscal_item_id, fiscal_variant_id,
                sync_stock, sync_price, is_active,
                last_synced_quantity, last_synced_at, last_error,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&mapping.id)
        .bind(&mapping.shop_id)
        .bind(mapping.commerce_product_id)
        .bind(mapping.commerce_variant_id)
        .bind(mapping.commerce_inventory_item_id)
        .bind(&mapping.commerce_sku)
        .bind(mapping.fiscal_item_id)
        .bind(mapping.fiscal_variant_id)
        .bind(mapping.sync_stock)
        .bind(mapping.sync_price)
        .bind(mapping.is_active)
        .bind(mapping.last_synced_quantity)
        .bind(mapping.last_synced_at)
        .bind(&mapping.last_error)
        .bind(mapping.created_at)
        .bind(mapping.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a mapping by id.
    pub async fn get(&self, id: &str) -> DbResult<CatalogMapping> {
        sqlx::query_as::<_, CatalogMapping>("SELECT * FROM catalog_mappings WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("CatalogMapping", id))
    }

    /// Finds the active mapping for an order line.
    ///
    /// Inactive mappings are treated as absent.
    pub async fn find_for_line(
        &self,
        shop_id: &str,
        product_id: i64,
        variant_id: Option<i64>,
    ) -> DbResult<Option<CatalogMapping>> {
        let mapping = sqlx::query_as::<_, CatalogMapping>(
            r#"
            SELECT * FROM catalog_mappings
            WHERE shop_id = ?1
              AND commerce_product_id = ?2
              AND (commerce_variant_id IS ?3 OR commerce_variant_id IS NULL)
              AND is_active = 1
            ORDER BY commerce_variant_id IS NULL ASC
            LIMIT 1
            "#,
        )
        .bind(shop_id)
        .bind(product_id)
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    /// Finds the active mapping that owns a commerce inventory item.
    pub async fn find_by_inventory_item(
        &self,
        shop_id: &str,
        inventory_item_id: i64,
    ) -> DbResult<Option<CatalogMapping>> {
        let mapping = sqlx::query_as::<_, CatalogMapping>(
            r#"
            SELECT * FROM catalog_mappings
            WHERE shop_id = ?1 AND commerce_inventory_item_id = ?2 AND is_active = 1
            LIMIT 1
            "#,
        )
        .bind(shop_id)
        .bind(inventory_item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    /// Lists mappings of a shop, oldest first.
    pub async fn list_for_shop(&self, shop_id: &str) -> DbResult<Vec<CatalogMapping>> {
        let mappings = sqlx::query_as::<_, CatalogMapping>(
            "SELECT * FROM catalog_mappings WHERE shop_id = ?1 ORDER BY created_at ASC",
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(mappings)
    }

    /// Caches the commerce inventory item id resolved from the variant.
    pub async fn set_inventory_item(&self, id: &str, inventory_item_id: i64) -> DbResult<()> {
        sqlx::query(
            "UPDATE catalog_mappings SET commerce_inventory_item_id = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(inventory_item_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a successful sync with compare-and-set on the baseline.
    ///
    /// ## Returns
    /// `false` if another sync moved `last_synced_quantity` away from
    /// `expected_previous` first; nothing is written in that case.
    pub async fn record_sync(
        &self,
        id: &str,
        expected_previous: Option<i64>,
        quantity: i64,
    ) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE catalog_mappings SET
                last_synced_quantity = ?3,
                last_synced_at = ?4,
                last_error = NULL,
                updated_at = ?4
            WHERE id = ?1 AND last_synced_quantity IS ?2
            "#,
        )
        .bind(id)
        .bind(expected_previous)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        debug!(mapping_id = %id, applied, quantity, "Recorded stock sync");
        Ok(applied)
    }

    /// Stores the last sync error on the mapping.
    pub async fn record_error(&self, id: &str, message: &str) -> DbResult<()> {
        sqlx::query("UPDATE catalog_mappings SET last_error = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(message)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
