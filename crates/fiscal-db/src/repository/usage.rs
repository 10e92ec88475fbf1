//! # Usage Counter Repository
//!
//! Monthly per-shop counters. Increments are a single upsert that adds to
//! the stored values, so concurrent tasks never lose an update.

use chrono::{Datelike, Utc};
use sqlx::SqlitePool;

use crate::error::DbResult;
use fiscal_core::{UsageCounter, UsageDelta};

/// Repository for usage counters.
#[derive(Debug, Clone)]
pub struct UsageRepository {
    pool: SqlitePool,
}

impl UsageRepository {
    /// Creates a new UsageRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UsageRepository { pool }
    }

    /// Adds `delta` to the current month's counters of a shop.
    pub async fn increment(&self, shop_id: &str, delta: &UsageDelta) -> DbResult<()> {
        if delta.is_empty() {
            return Ok(());
        }

        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO usage_counters (
                shop_id, year, month,
                orders_count, documents_count, receipts_count, invoices_count,
                sales_notes_count, credit_notes_count, stock_syncs_count, errors_count,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (shop_id, year, month) DO UPDATE SET
                orders_count       = orders_count       + excluded.orders_count,
                documents_count    = documents_count    + excluded.documents_count,
                receipts_count     = receipts_count     + excluded.receipts_count,
                invoices_count     = invoices_count     + excluded.invoices_count,
                sales_notes_count  = sales_notes_count  + excluded.sales_notes_count,
                credit_notes_count = credit_notes_count + excluded.credit_notes_count,
                stock_syncs_count  = stock_syncs_count  + excluded.stock_syncs_count,
                errors_count       = errors_count       + excluded.errors_count,
                updated_at         = excluded.updated_at
            "#,
        )
        .bind(shop_id)
        .bind(i64::from(now.year()))
        .bind(i64::from(now.month()))
        .bind(delta.orders)
        .bind(delta.documents)
        .bind(delta.receipts)
        .bind(delta.invoices)
        .bind(delta.sales_notes)
        .bind(delta.credit_notes)
        .bind(delta.stock_syncs)
        .bind(delta.errors)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the counters of one month.
    pub async fn get(&self, shop_id: &str, year: i32, month: u32) -> DbResult<Option<UsageCounter>> {
        let counter = sqlx::query_as::<_, UsageCounter>(
            "SELECT * FROM usage_counters WHERE shop_id = ?1 AND year = ?2 AND month = ?3",
        )
        .bind(shop_id)
        .bind(i64::from(year))
        .bind(i64::from(month))
        .fetch_optional(&self.pool)
        .await?;

        Ok(counter)
    }

    /// Gets the current month's counters.
    pub async fn current(&self, shop_id: &str) -> DbResult<Option<UsageCounter>> {
        let now = Utc::now();
        self.get(shop_id, now.year(), now.month()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{seeded_shop, test_db};
    use fiscal_core::DocumentType;

    #[tokio::test]
    async fn test_increments_accumulate() {
        let db = test_db().await;
        let shop = seeded_shop(&db).await;

        db.usage()
            .increment(&shop.id, &UsageDelta::document_issued(DocumentType::Receipt))
            .await
            .unwrap();
        db.usage()
            .increment(&shop.id, &UsageDelta::document_issued(DocumentType::CreditNote))
            .await
            .unwrap();
        db.usage().increment(&shop.id, &UsageDelta::error()).await.unwrap();
        db.usage().increment(&shop.id, &UsageDelta::default()).await.unwrap();

        let counter = db.usage().current(&shop.id).await.unwrap().unwrap();
        assert_eq!(counter.orders_count, 1);
        assert_eq!(counter.documents_count, 2);
        assert_eq!(counter.receipts_count, 1);
        assert_eq!(counter.credit_notes_count, 1);
        assert_eq!(counter.errors_count, 1);
        assert_eq!(counter.stock_syncs_count, 0);
    }

    #[tokio::test]
    async fn test_concurrent_increments_not_lost() {
        let db = test_db().await;
        let shop = seeded_shop(&db).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = db.usage();
            let shop_id = shop.id.clone();
            handles.push(tokio::spawn(async move {
                repo.increment(&shop_id, &UsageDelta::stock_sync()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let counter = db.usage().current(&shop.id).await.unwrap().unwrap();
        assert_eq!(counter.stock_syncs_count, 10);
    }
}
