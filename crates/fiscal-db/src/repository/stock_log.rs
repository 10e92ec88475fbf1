//! # Stock Sync Log Repository
//!
//! Append-only history of reconciliation runs. The table carries a trigger
//! that aborts any UPDATE, so entries can only be added.

use sqlx::SqlitePool;

use crate::error::DbResult;
use fiscal_core::StockSyncLogEntry;

/// Repository for the stock sync log.
#[derive(Debug, Clone)]
pub struct StockLogRepository {
    pool: SqlitePool,
}

impl StockLogRepository {
    /// Creates a new StockLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockLogRepository { pool }
    }

    /// Appends one entry.
    pub async fn append(&self, entry: &StockSyncLogEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_sync_logs (
                id, shop_id, mapping_id, direction,
                previous_quantity, new_quantity, delta,
                source, source_id, status, error_message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.shop_id)
        .bind(&entry.mapping_id)
        .bind(entry.direction)
        .bind(entry.previous_quantity)
        .bind(entry.new_quantity)
        .bind(entry.delta)
        .bind(entry.source)
        .bind(&entry.source_id)
        .bind(entry.status)
        .bind(&entry.error_message)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Entries for one mapping, newest first.
    pub async fn list_for_mapping(&self, mapping_id: &str) -> DbResult<Vec<StockSyncLogEntry>> {
        let entries = sqlx::query_as::<_, StockSyncLogEntry>(
            "SELECT * FROM stock_sync_logs WHERE mapping_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )
        .bind(mapping_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries for a shop, newest first.
    pub async fn list_for_shop(&self, shop_id: &str, limit: u32) -> DbResult<Vec<StockSyncLogEntry>> {
        let entries = sqlx::query_as::<_, StockSyncLogEntry>(
            r#"
            SELECT * FROM stock_sync_logs
            WHERE shop_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(shop_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::repository::test_support::{sample_mapping, seeded_shop, test_db};
    use chrono::Utc;
    use fiscal_core::{SyncDirection, SyncSource, SyncStatus};
    use uuid::Uuid;

    fn entry(shop_id: &str, mapping_id: &str, new_quantity: i64) -> StockSyncLogEntry {
        StockSyncLogEntry {
            id: Uuid::new_v4().to_string(),
            shop_id: shop_id.to_string(),
            mapping_id: Some(mapping_id.to_string()),
            direction: SyncDirection::ToExternal,
            previous_quantity: Some(10),
            new_quantity: Some(new_quantity),
            delta: Some(new_quantity - 10),
            source: SyncSource::Manual,
            source_id: None,
            status: SyncStatus::Success,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let db = test_db().await;
        let shop = seeded_shop(&db).await;
        let mapping = sample_mapping(&shop.id, 7, Some(70));
        db.mappings().insert(&mapping).await.unwrap();

        db.stock_logs().append(&entry(&shop.id, &mapping.id, 7)).await.unwrap();
        db.stock_logs().append(&entry(&shop.id, &mapping.id, 4)).await.unwrap();

        let entries = db.stock_logs().list_for_mapping(&mapping.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].new_quantity, Some(4));
        assert_eq!(entries[0].delta, Some(-6));
        assert_eq!(db.stock_logs().list_for_shop(&shop.id, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_entries_cannot_be_rewritten() {
        let db = test_db().await;
        let shop = seeded_shop(&db).await;
        let mapping = sample_mapping(&shop.id, 7, Some(70));
        db.mappings().insert(&mapping).await.unwrap();
        db.stock_logs().append(&entry(&shop.id, &mapping.id, 7)).await.unwrap();

        let err: DbError = sqlx::query("UPDATE stock_sync_logs SET new_quantity = 0")
            .execute(db.pool())
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::QueryFailed(_)));
    }
}
