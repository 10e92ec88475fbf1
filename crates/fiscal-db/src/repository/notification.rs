//! # Notification Repository
//!
//! Merchant-facing notifications raised by the pipeline.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbResult;
use fiscal_core::{NewNotification, Notification};

/// Repository for notifications.
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    /// Creates a new NotificationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NotificationRepository { pool }
    }

    /// Persists a notification and returns the stored row.
    pub async fn create(&self, shop_id: &str, new: &NewNotification) -> DbResult<Notification> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            shop_id: shop_id.to_string(),
            kind: new.kind,
            title: new.title.clone(),
            message: new.message.clone(),
            entity_type: new.entity_type.clone(),
            entity_id: new.entity_id.clone(),
            is_read: false,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, shop_id, kind, title, message, entity_type, entity_id, is_read, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.shop_id)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.entity_type)
        .bind(&notification.entity_id)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(notification)
    }

    /// Unread notifications, newest first.
    pub async fn list_unread(&self, shop_id: &str) -> DbResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE shop_id = ?1 AND is_read = 0
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Marks one notification read. Returns `false` if it was unknown.
    pub async fn mark_read(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
