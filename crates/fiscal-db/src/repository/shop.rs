//! # Shop Repository
//!
//! Installed shops, their credentials and their [`ShopSettings`]. The
//! install flow that creates shops lives outside this service; the bridge
//! reads them and only writes the uninstall marker.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use fiscal_core::{Shop, ShopSettings};

/// Repository for shop operations.
#[derive(Debug, Clone)]
pub struct ShopRepository {
    pool: SqlitePool,
}

impl ShopRepository {
    /// Creates a new ShopRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ShopRepository { pool }
    }

    /// Gets a shop by id.
    pub async fn get(&self, id: &str) -> DbResult<Shop> {
        sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Shop", id))
    }

    /// Finds a shop by its commerce domain (`store.myshopify.com`).
    pub async fn find_by_domain(&self, domain: &str) -> DbResult<Option<Shop>> {
        let shop = sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE domain = ?1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;

        Ok(shop)
    }

    /// Inserts or updates a shop keyed by domain.
    ///
    /// Settings are validated here so an invalid document type map can
    /// never reach the issuer.
    pub async fn upsert(&self, shop: &Shop) -> DbResult<()> {
        shop.validate()?;

        debug!(domain = %shop.domain, "Upserting shop");

        sqlx::query(
            r#"
            INSERT INTO shops (
                id, domain, commerce_access_token, commerce_location_id,
                fiscal_api_token, fiscal_branch_id, fiscal_warehouse_id,
                is_configured, settings, installed_at, uninstalled_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(domain) DO UPDATE SET
                commerce_access_token = excluded.commerce_access_token,
                commerce_location_id  = excluded.commerce_location_id,
                fiscal_api_token      = excluded.fiscal_api_token,
                fiscal_branch_id      = excluded.fiscal_branch_id,
                fiscal_warehouse_id   = excluded.fiscal_warehouse_id,
                is_configured         = excluded.is_configured,
                settings              = excluded.settings,
                uninstalled_at        = excluded.uninstalled_at,
                updated_at            = excluded.updated_at
            "#,
        )
        .bind(&shop.id)
        .bind(&shop.domain)
        .bind(&shop.commerce_access_token)
        .bind(shop.commerce_location_id)
        .bind(&shop.fiscal_api_token)
        .bind(shop.fiscal_branch_id)
        .bind(shop.fiscal_warehouse_id)
        .bind(shop.is_configured)
        .bind(Json(&shop.settings))
        .bind(shop.installed_at)
        .bind(shop.uninstalled_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces only the settings of a shop, validating them first.
    pub async fn update_settings(&self, id: &str, settings: &ShopSettings) -> DbResult<()> {
        let mut shop = self.get(id).await?;
        shop.settings = settings.clone();
        shop.validate()?;

        sqlx::query("UPDATE shops SET settings = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(Json(settings))
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Marks a shop as uninstalled and drops its commerce token.
    ///
    /// ## Returns
    /// `true` if a shop with that domain existed.
    pub async fn mark_uninstalled(&self, domain: &str, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shops SET
                uninstalled_at = ?2,
                commerce_access_token = '',
                updated_at = ?2
            WHERE domain = ?1
            "#,
        )
        .bind(domain)
        .bind(at)
        .execute(&self.pool)
        .await?;

        let found = result.rows_affected() == 1;
        if found {
            info!(domain = %domain, "Shop marked uninstalled");
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{sample_shop, test_db};
    use fiscal_core::{DocumentType, SyncDirection};

    #[tokio::test]
    async fn test_upsert_and_find_roundtrip_settings() {
        let db = test_db().await;
        let mut shop = sample_shop("andes.myshopify.com");
        shop.settings.stock_sync_direction = SyncDirection::ToCommerce;
        shop.settings.sync_stock_enabled = true;
        db.shops().upsert(&shop).await.unwrap();

        let found = db
            .shops()
            .find_by_domain("andes.myshopify.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, shop.id);
        assert_eq!(found.settings, shop.settings);
        assert!(found.is_active());
    }

    #[tokio::test]
    async fn test_upsert_updates_existing_domain() {
        let db = test_db().await;
        let shop = sample_shop("andes.myshopify.com");
        db.shops().upsert(&shop).await.unwrap();

        let mut changed = shop.clone();
        changed.id = "ignored-new-id".to_string();
        changed.fiscal_branch_id = Some(42);
        db.shops().upsert(&changed).await.unwrap();

        let found = db.shops().get(&shop.id).await.unwrap();
        assert_eq!(found.fiscal_branch_id, Some(42));
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let db = test_db().await;
        let mut shop = sample_shop("andes.myshopify.com");
        shop.settings.default_document_type = DocumentType::Invoice;

        // Configured invoice shop without an invoice type id.
        let err = db.shops().upsert(&shop).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        shop.settings
            .document_type_ids
            .insert(DocumentType::Invoice, 2);
        db.shops().upsert(&shop).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_settings_validates() {
        let db = test_db().await;
        let shop = sample_shop("andes.myshopify.com");
        db.shops().upsert(&shop).await.unwrap();

        let mut settings = shop.settings.clone();
        settings.fallback_document_type = DocumentType::Invoice;
        assert!(db.shops().update_settings(&shop.id, &settings).await.is_err());

        settings.fallback_document_type = DocumentType::Receipt;
        settings.require_all_items_mapped = true;
        db.shops().update_settings(&shop.id, &settings).await.unwrap();
        assert!(db.shops().get(&shop.id).await.unwrap().settings.require_all_items_mapped);
    }

    #[tokio::test]
    async fn test_mark_uninstalled() {
        let db = test_db().await;
        let shop = sample_shop("andes.myshopify.com");
        db.shops().upsert(&shop).await.unwrap();

        assert!(db
            .shops()
            .mark_uninstalled("andes.myshopify.com", Utc::now())
            .await
            .unwrap());
        assert!(!db
            .shops()
            .mark_uninstalled("missing.myshopify.com", Utc::now())
            .await
            .unwrap());

        let found = db.shops().get(&shop.id).await.unwrap();
        assert!(!found.is_active());
        assert_eq!(found.commerce_access_token, "");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let db = test_db().await;
        assert!(matches!(
            db.shops().get("nope").await,
            Err(DbError::NotFound { .. })
        ));
    }
}
