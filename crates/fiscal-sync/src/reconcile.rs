//! # Stock Reconciliation Engine
//!
//! Moves available quantities between the commerce catalog and the fiscal
//! catalog for one mapping.
//!
//! ## Run Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sync_mapping(shop, mapping_id, direction, source)                      │
//! │                                                                         │
//! │  1. Gate (rejected runs leave no log entry)                             │
//! │     • mapping belongs to shop, active, sync_stock                       │
//! │     • shop stock sync enabled, policy allows direction                  │
//! │                                                                         │
//! │  2. Resolve ids                                                         │
//! │     • inventory item: mapping ──► variant lookup (cached on mapping)    │
//! │     • location: shop ──► first commerce location                        │
//! │                                                                         │
//! │  3. Execute                                                             │
//! │     to_external    read commerce ──► write fiscal                       │
//! │     to_commerce    read fiscal ──► write commerce                       │
//! │     bidirectional  read both ──► plan_bidirectional ──► ≤ 1 write       │
//! │                                                                         │
//! │  4. Record                                                              │
//! │     • baseline CAS on last_synced_quantity                              │
//! │     • exactly one StockSyncLogEntry (success / skipped / error)         │
//! │     • failures: mapping.last_error + error count, never raised          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fiscal_core::stock::{delta, plan_bidirectional, StockPlan};
use fiscal_core::{
    CatalogMapping, Shop, StockSyncLogEntry, SyncDirection, SyncSource, SyncStatus, UsageDelta,
};
use fiscal_db::Database;

use crate::clients::{ClientFactory, CommerceApi};
use crate::error::{SyncError, SyncResult};
use crate::meter::UsageMeter;

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RunOutcome {
    /// Leg applied, or the requested direction when nothing was written.
    direction: SyncDirection,
    previous: Option<i64>,
    /// `None` when a catalog had no stock record to read.
    quantity: Option<i64>,
    wrote: bool,
    /// Why nothing was written, when the run was skipped for a reason.
    note: Option<String>,
}

/// Commerce-side coordinates of a mapping.
#[derive(Debug, Clone, Copy)]
struct CommerceTarget {
    inventory_item_id: i64,
    location_id: i64,
}

/// Reconciles stock for single mappings.
#[derive(Clone)]
pub struct StockReconciler {
    db: Database,
    clients: Arc<dyn ClientFactory>,
    meter: UsageMeter,
}

impl StockReconciler {
    pub fn new(db: Database, clients: Arc<dyn ClientFactory>) -> Self {
        let meter = UsageMeter::new(&db);
        StockReconciler { db, clients, meter }
    }

    /// Runs one reconciliation and returns the log entry it appended.
    ///
    /// ## Errors
    /// Only for rejected requests (unknown mapping, disabled sync,
    /// disallowed direction) and storage failures. External failures and
    /// conflicts are reported through the returned entry.
    pub async fn sync_mapping(
        &self,
        shop: &Shop,
        mapping_id: &str,
        direction: SyncDirection,
        source: SyncSource,
        source_id: Option<String>,
    ) -> SyncResult<StockSyncLogEntry> {
        let mapping = self.db.mappings().get(mapping_id).await.map_err(|e| match e {
            fiscal_db::DbError::NotFound { .. } => SyncError::not_found("CatalogMapping", mapping_id),
            other => other.into(),
        })?;
        self.check_allowed(shop, &mapping, direction)?;

        let result = self.execute(shop, &mapping, direction).await;

        let entry = match result {
            Ok(outcome) => {
                let entry = StockSyncLogEntry {
                    id: Uuid::new_v4().to_string(),
                    shop_id: shop.id.clone(),
                    mapping_id: Some(mapping.id.clone()),
                    direction: outcome.direction,
                    previous_quantity: outcome.previous,
                    new_quantity: outcome.quantity,
                    delta: outcome.quantity.and_then(|q| delta(outcome.previous, q)),
                    source,
                    source_id,
                    status: if outcome.wrote {
                        SyncStatus::Success
                    } else {
                        SyncStatus::Skipped
                    },
                    error_message: outcome.note.clone(),
                    created_at: Utc::now(),
                };
                if outcome.wrote {
                    self.meter.record(&shop.id, &UsageDelta::stock_sync()).await;
                }
                info!(
                    shop_id = %shop.id,
                    mapping_id = %mapping.id,
                    direction = %entry.direction,
                    previous = ?entry.previous_quantity,
                    quantity = ?outcome.quantity,
                    status = ?entry.status,
                    "Stock sync finished"
                );
                entry
            }
            Err(err) => {
                let message = err.to_string();
                warn!(
                    shop_id = %shop.id,
                    mapping_id = %mapping.id,
                    direction = %direction,
                    error = %message,
                    "Stock sync failed"
                );
                if let Err(e) = self.db.mappings().record_error(&mapping.id, &message).await {
                    warn!(mapping_id = %mapping.id, error = %e, "Failed to record mapping error");
                }
                self.meter.record(&shop.id, &UsageDelta::error()).await;
                StockSyncLogEntry {
                    id: Uuid::new_v4().to_string(),
                    shop_id: shop.id.clone(),
                    mapping_id: Some(mapping.id.clone()),
                    direction,
                    previous_quantity: mapping.last_synced_quantity,
                    new_quantity: None,
                    delta: None,
                    source,
                    source_id,
                    status: SyncStatus::Error,
                    error_message: Some(message),
                    created_at: Utc::now(),
                }
            }
        };

        self.db.stock_logs().append(&entry).await?;
        Ok(entry)
    }

    fn check_allowed(
        &self,
        shop: &Shop,
        mapping: &CatalogMapping,
        direction: SyncDirection,
    ) -> SyncResult<()> {
        if mapping.shop_id != shop.id {
            return Err(SyncError::not_found("CatalogMapping", &mapping.id));
        }
        if !shop.settings.sync_stock_enabled {
            return Err(SyncError::StockSyncDisabled(format!(
                "stock sync is disabled for {}",
                shop.domain
            )));
        }
        if !mapping.sync_stock || !mapping.is_active {
            return Err(SyncError::StockSyncDisabled(format!(
                "mapping {} does not sync stock",
                mapping.id
            )));
        }
        if !shop.settings.allows_direction(direction) {
            return Err(SyncError::DirectionNotAllowed {
                requested: direction,
                policy: shop.settings.stock_sync_direction,
            });
        }
        Ok(())
    }

    async fn execute(
        &self,
        shop: &Shop,
        mapping: &CatalogMapping,
        direction: SyncDirection,
    ) -> SyncResult<RunOutcome> {
        let fiscal = self.clients.fiscal(shop)?;
        let commerce = self.clients.commerce(shop)?;
        let target = self.commerce_target(shop, mapping, commerce.as_ref()).await?;
        let variant_id = mapping.fiscal_line_id();
        let previous = mapping.last_synced_quantity;

        let skipped = |note: String| {
            warn!(mapping_id = %mapping.id, direction = %direction, "{note}; nothing written");
            RunOutcome {
                direction,
                previous,
                quantity: None,
                wrote: false,
                note: Some(note),
            }
        };
        let no_commerce_level = || {
            format!(
                "no commerce inventory level for item {} at location {}",
                target.inventory_item_id, target.location_id
            )
        };
        let no_fiscal_stock = || format!("no fiscal stock record for variant {variant_id}");

        let (leg, quantity) = match direction {
            SyncDirection::ToExternal => {
                let Some(quantity) = read_commerce(commerce.as_ref(), target).await? else {
                    return Ok(skipped(no_commerce_level()));
                };
                (Some(SyncDirection::ToExternal), quantity)
            }
            SyncDirection::ToCommerce => {
                let Some(quantity) = fiscal.get_stock(variant_id, shop.fiscal_warehouse_id).await?
                else {
                    return Ok(skipped(no_fiscal_stock()));
                };
                (Some(SyncDirection::ToCommerce), quantity)
            }
            SyncDirection::Bidirectional => {
                let Some(commerce_qty) = read_commerce(commerce.as_ref(), target).await? else {
                    return Ok(skipped(no_commerce_level()));
                };
                let Some(fiscal_qty) = fiscal.get_stock(variant_id, shop.fiscal_warehouse_id).await?
                else {
                    return Ok(skipped(no_fiscal_stock()));
                };
                debug!(
                    mapping_id = %mapping.id,
                    baseline = ?previous,
                    commerce = commerce_qty,
                    external = fiscal_qty,
                    "Planning bidirectional sync"
                );
                match plan_bidirectional(previous, commerce_qty, fiscal_qty) {
                    StockPlan::InSync { quantity } => (None, quantity),
                    StockPlan::PushToExternal { quantity } => {
                        (Some(SyncDirection::ToExternal), quantity)
                    }
                    StockPlan::PushToCommerce { quantity } => {
                        (Some(SyncDirection::ToCommerce), quantity)
                    }
                    StockPlan::Conflict { .. } => return Err(SyncError::Conflict),
                }
            }
        };

        match leg {
            Some(SyncDirection::ToExternal) => {
                let warehouse = shop
                    .fiscal_warehouse_id
                    .ok_or_else(|| SyncError::Config("no fiscal warehouse configured".into()))?;
                fiscal.set_stock(variant_id, warehouse, quantity).await?;
            }
            Some(SyncDirection::ToCommerce) => {
                commerce
                    .set_inventory_level(target.inventory_item_id, target.location_id, quantity)
                    .await?;
            }
            _ => {}
        }

        let applied = self
            .db
            .mappings()
            .record_sync(&mapping.id, previous, quantity)
            .await?;
        if !applied {
            warn!(
                mapping_id = %mapping.id,
                expected = ?previous,
                quantity,
                "Baseline moved by a concurrent sync; left unchanged"
            );
        }

        Ok(RunOutcome {
            direction: leg.unwrap_or(direction),
            previous,
            quantity: Some(quantity),
            wrote: leg.is_some(),
            note: None,
        })
    }

    /// Resolves the commerce inventory item and location of a mapping.
    async fn commerce_target(
        &self,
        shop: &Shop,
        mapping: &CatalogMapping,
        commerce: &dyn CommerceApi,
    ) -> SyncResult<CommerceTarget> {
        let inventory_item_id = match mapping.commerce_inventory_item_id {
            Some(id) => id,
            None => {
                let variant_id = mapping.commerce_variant_id.ok_or_else(|| {
                    SyncError::Config(format!(
                        "mapping {} has no commerce variant or inventory item",
                        mapping.id
                    ))
                })?;
                let variant = commerce.get_variant(variant_id).await?;
                let id = variant.inventory_item_id.ok_or_else(|| {
                    SyncError::Config(format!("variant {variant_id} has no inventory item"))
                })?;
                self.db.mappings().set_inventory_item(&mapping.id, id).await?;
                id
            }
        };

        let location_id = match shop.commerce_location_id {
            Some(id) => id,
            None => commerce
                .list_locations()
                .await?
                .first()
                .map(|location| location.id)
                .ok_or_else(|| SyncError::Config("shop has no commerce locations".into()))?,
        };

        Ok(CommerceTarget {
            inventory_item_id,
            location_id,
        })
    }
}

async fn read_commerce(
    commerce: &dyn CommerceApi,
    target: CommerceTarget,
) -> SyncResult<Option<i64>> {
    Ok(commerce
        .get_inventory_level(target.inventory_item_id, target.location_id)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fakes::FakeClientFactory;
    use crate::clients::CommerceVariant;
    use crate::test_support::{mapping, seeded_shop, test_db};

    struct Fixture {
        db: Database,
        shop: Shop,
        mapping: CatalogMapping,
        fakes: FakeClientFactory,
        reconciler: StockReconciler,
    }

    /// Shop with stock sync on, one mapping: inventory item 700, fiscal
    /// variant 70, location 1, warehouse 1.
    async fn fixture(policy: SyncDirection, baseline: Option<i64>) -> Fixture {
        let db = test_db().await;
        let mut shop = seeded_shop(&db).await;
        shop.settings.sync_stock_enabled = true;
        shop.settings.stock_sync_direction = policy;
        db.shops().upsert(&shop).await.unwrap();

        let mut m = mapping(&shop.id, 7, Some(77), 70);
        m.last_synced_quantity = baseline;
        db.mappings().insert(&m).await.unwrap();

        let fakes = FakeClientFactory::new();
        let reconciler = StockReconciler::new(db.clone(), Arc::new(fakes.clone()));
        Fixture {
            db,
            shop,
            mapping: m,
            fakes,
            reconciler,
        }
    }

    async fn run(f: &Fixture, direction: SyncDirection) -> StockSyncLogEntry {
        f.reconciler
            .sync_mapping(&f.shop, &f.mapping.id, direction, SyncSource::Manual, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_to_external_records_negative_delta() {
        let f = fixture(SyncDirection::Bidirectional, Some(10)).await;
        f.fakes.commerce.set_level(700, 1, 7).await;

        let entry = run(&f, SyncDirection::ToExternal).await;

        assert_eq!(entry.status, SyncStatus::Success);
        assert_eq!(entry.direction, SyncDirection::ToExternal);
        assert_eq!(entry.previous_quantity, Some(10));
        assert_eq!(entry.new_quantity, Some(7));
        assert_eq!(entry.delta, Some(-3));
        assert_eq!(f.fakes.fiscal.stock_writes().await, vec![(70, 1, 7)]);

        let stored = f.db.mappings().get(&f.mapping.id).await.unwrap();
        assert_eq!(stored.last_synced_quantity, Some(7));
        assert_eq!(f.db.stock_logs().list_for_mapping(&f.mapping.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_to_commerce_writes_fiscal_quantity() {
        let f = fixture(SyncDirection::ToCommerce, None).await;
        f.fakes.fiscal.set_stock(70, 12).await;

        let entry = run(&f, SyncDirection::ToCommerce).await;

        assert_eq!(entry.status, SyncStatus::Success);
        assert_eq!(entry.delta, None);
        assert_eq!(f.fakes.commerce.level_of(700, 1).await, Some(12));
    }

    #[tokio::test]
    async fn test_policy_rejects_direction_without_entry() {
        let f = fixture(SyncDirection::ToExternal, None).await;

        let err = f
            .reconciler
            .sync_mapping(&f.shop, &f.mapping.id, SyncDirection::ToCommerce, SyncSource::Manual, None)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::DirectionNotAllowed { .. }));
        assert!(f.db.stock_logs().list_for_mapping(&f.mapping.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mapping_without_stock_sync_rejected() {
        let f = fixture(SyncDirection::Bidirectional, None).await;
        let mut other = mapping(&f.shop.id, 8, Some(88), 80);
        other.sync_stock = false;
        f.db.mappings().insert(&other).await.unwrap();

        let err = f
            .reconciler
            .sync_mapping(&f.shop, &other.id, SyncDirection::ToExternal, SyncSource::Manual, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::StockSyncDisabled(_)));
    }

    #[tokio::test]
    async fn test_bidirectional_follows_the_changed_side() {
        let f = fixture(SyncDirection::Bidirectional, Some(10)).await;
        f.fakes.commerce.set_level(700, 1, 10).await;
        f.fakes.fiscal.set_stock(70, 4).await;

        let entry = run(&f, SyncDirection::Bidirectional).await;

        assert_eq!(entry.status, SyncStatus::Success);
        assert_eq!(entry.direction, SyncDirection::ToCommerce);
        assert_eq!(entry.delta, Some(-6));
        assert_eq!(f.fakes.commerce.level_writes().await, vec![(700, 1, 4)]);
        assert!(f.fakes.fiscal.stock_writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_bidirectional_conflict_writes_nothing() {
        let f = fixture(SyncDirection::Bidirectional, Some(10)).await;
        f.fakes.commerce.set_level(700, 1, 7).await;
        f.fakes.fiscal.set_stock(70, 4).await;

        let entry = run(&f, SyncDirection::Bidirectional).await;

        assert_eq!(entry.status, SyncStatus::Error);
        assert_eq!(
            entry.error_message.as_deref(),
            Some("conflict: both catalogs changed since last sync")
        );
        assert!(f.fakes.commerce.level_writes().await.is_empty());
        assert!(f.fakes.fiscal.stock_writes().await.is_empty());

        let stored = f.db.mappings().get(&f.mapping.id).await.unwrap();
        assert_eq!(stored.last_synced_quantity, Some(10));
        assert!(stored.last_error.is_some());
    }

    #[tokio::test]
    async fn test_in_sync_is_skipped() {
        let f = fixture(SyncDirection::Bidirectional, Some(10)).await;
        f.fakes.commerce.set_level(700, 1, 6).await;
        f.fakes.fiscal.set_stock(70, 6).await;

        let entry = run(&f, SyncDirection::Bidirectional).await;

        assert_eq!(entry.status, SyncStatus::Skipped);
        assert_eq!(entry.new_quantity, Some(6));
        let stored = f.db.mappings().get(&f.mapping.id).await.unwrap();
        assert_eq!(stored.last_synced_quantity, Some(6));
    }

    #[tokio::test]
    async fn test_external_failure_is_logged_not_raised() {
        let f = fixture(SyncDirection::Bidirectional, Some(10)).await;
        f.fakes.commerce.set_level(700, 1, 7).await;
        f.fakes.fiscal.fail_with_status(503).await;

        let entry = run(&f, SyncDirection::ToExternal).await;

        assert_eq!(entry.status, SyncStatus::Error);
        assert!(entry.error_message.unwrap().contains("503"));
        let counter = f.db.usage().current(&f.shop.id).await.unwrap().unwrap();
        assert_eq!(counter.errors_count, 1);
        assert_eq!(counter.stock_syncs_count, 0);

        let logs = f.db.stock_logs().list_for_mapping(&f.mapping.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, SyncStatus::Error);
        let stored = f.db.mappings().get(&f.mapping.id).await.unwrap();
        assert!(stored.last_error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_missing_fiscal_stock_does_not_zero_commerce() {
        let f = fixture(SyncDirection::Bidirectional, Some(25)).await;
        f.fakes.commerce.set_level(700, 1, 25).await;

        let entry = run(&f, SyncDirection::ToCommerce).await;

        assert_eq!(entry.status, SyncStatus::Skipped);
        assert_eq!(entry.new_quantity, None);
        assert_eq!(entry.delta, None);
        assert!(entry.error_message.unwrap().contains("no fiscal stock record"));
        assert!(f.fakes.commerce.level_writes().await.is_empty());
        assert_eq!(f.fakes.commerce.level_of(700, 1).await, Some(25));

        let stored = f.db.mappings().get(&f.mapping.id).await.unwrap();
        assert_eq!(stored.last_synced_quantity, Some(25));
    }

    #[tokio::test]
    async fn test_missing_commerce_level_does_not_zero_fiscal() {
        let f = fixture(SyncDirection::Bidirectional, None).await;
        f.fakes.fiscal.set_stock(70, 9).await;

        for direction in [SyncDirection::ToExternal, SyncDirection::Bidirectional] {
            let entry = run(&f, direction).await;
            assert_eq!(entry.status, SyncStatus::Skipped);
            assert!(entry.error_message.unwrap().contains("no commerce inventory level"));
        }
        assert!(f.fakes.fiscal.stock_writes().await.is_empty());
        assert_eq!(f.fakes.fiscal.stock_of(70).await, Some(9));
    }

    #[tokio::test]
    async fn test_inventory_item_resolved_from_variant_and_cached() {
        let f = fixture(SyncDirection::Bidirectional, None).await;
        let mut bare = mapping(&f.shop.id, 9, Some(99), 90);
        bare.commerce_inventory_item_id = None;
        f.db.mappings().insert(&bare).await.unwrap();
        f.fakes
            .commerce
            .add_variant(CommerceVariant {
                id: 99,
                product_id: Some(9),
                sku: None,
                inventory_item_id: Some(9900),
            })
            .await;
        f.fakes.commerce.set_level(9900, 1, 3).await;

        let entry = f
            .reconciler
            .sync_mapping(&f.shop, &bare.id, SyncDirection::ToExternal, SyncSource::Manual, None)
            .await
            .unwrap();

        assert_eq!(entry.new_quantity, Some(3));
        let stored = f.db.mappings().get(&bare.id).await.unwrap();
        assert_eq!(stored.commerce_inventory_item_id, Some(9900));
    }
}
