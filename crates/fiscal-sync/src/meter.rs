//! # Usage Meter & Notifier
//!
//! Side effects that accompany every pipeline outcome. Both are best
//! effort: a failure here is logged and never replaces the outcome being
//! reported.

use tracing::{error, warn};

use fiscal_core::{NewNotification, NotificationKind, UsageDelta};
use fiscal_db::{Database, NotificationRepository, UsageRepository};

/// Records usage counters and merchant notifications.
#[derive(Debug, Clone)]
pub struct UsageMeter {
    usage: UsageRepository,
    notifications: NotificationRepository,
}

impl UsageMeter {
    pub fn new(db: &Database) -> Self {
        UsageMeter {
            usage: db.usage(),
            notifications: db.notifications(),
        }
    }

    /// Adds `delta` to the shop's current month.
    pub async fn record(&self, shop_id: &str, delta: &UsageDelta) {
        if let Err(e) = self.usage.increment(shop_id, delta).await {
            error!(shop_id = %shop_id, error = %e, ?delta, "Failed to record usage");
        }
    }

    /// Persists a notification and mirrors it to the log.
    pub async fn notify(&self, shop_id: &str, notification: NewNotification) {
        match notification.kind {
            NotificationKind::Error => error!(
                shop_id = %shop_id,
                title = %notification.title,
                entity_id = ?notification.entity_id,
                "{}",
                notification.message
            ),
            _ => warn!(
                shop_id = %shop_id,
                title = %notification.title,
                entity_id = ?notification.entity_id,
                "{}",
                notification.message
            ),
        }

        if let Err(e) = self.notifications.create(shop_id, &notification).await {
            error!(shop_id = %shop_id, error = %e, "Failed to store notification");
        }
    }

    /// Counts an error and raises an error notification about an entity.
    pub async fn record_failure(
        &self,
        shop_id: &str,
        title: &str,
        message: String,
        entity_type: &str,
        entity_id: &str,
    ) {
        self.record(shop_id, &UsageDelta::error()).await;
        self.notify(
            shop_id,
            NewNotification::error(title, message).about(entity_type, entity_id),
        )
        .await;
    }
}
