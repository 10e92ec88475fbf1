//! # Event Processor
//!
//! Runs inbound commerce events through the event ledger exactly once.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  handle_webhook(domain, topic, body)                                    │
//! │                                                                         │
//! │  parse natural id ──► app/uninstalled? ──► mark shop, done              │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  shop known & active? ── no ──► Ignored                                 │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ledger claim (insert-if-absent)                                        │
//! │        │ existing ──► Duplicate (completed / processing / failed)       │
//! │        ▼                                                                │
//! │  CAS pending → processing ── lost ──► Duplicate                         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  run topic pipeline                                                     │
//! │   orders/create            resolve ─► normalize ─► map ─► issue         │
//! │   orders/cancelled         fetch original ─► credit note ─► cancel      │
//! │   inventory_levels/update  reconcile to_external                        │
//! │        │                                                                │
//! │        ├── ok ──► completed (result JSON), usage                        │
//! │        └── err ─► failed (retryable?, next attempt), error + notify     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures never propagate to the webhook caller: they are recorded on the
//! ledger row and picked up by the replay worker when retryable.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fiscal_core::resolver::resolve_document_type;
use fiscal_core::transform::normalize_order;
use fiscal_core::{
    CommerceOrder, CoreError, DocumentStatus, DocumentType, EventRecord, EventStatus, EventTopic,
    FiscalDocument, InventoryLevelUpdate, Shop, SyncDirection, SyncSource, UsageDelta,
};
use fiscal_db::{Cancellation, Claim, Database, DbError};

use crate::clients::ClientFactory;
use crate::config::ReplaySettings;
use crate::error::{SyncError, SyncResult};
use crate::issuer::{CreditReference, DocumentIssuer};
use crate::mapper::LineMapper;
use crate::meter::UsageMeter;
use crate::reconcile::StockReconciler;

// =============================================================================
// Outcome
// =============================================================================

/// What happened to one delivered or replayed event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The pipeline ran and the ledger row is `completed`.
    Completed { event_id: String, result: Value },

    /// The pipeline ran and the ledger row is `failed`.
    Failed {
        event_id: String,
        error: String,
        retryable: bool,
    },

    /// A ledger row already existed or another worker owns it.
    Duplicate { event_id: String, status: EventStatus },

    /// Nothing to do for this shop or topic; no ledger row was written.
    Ignored { reason: String },

    /// The shop was marked uninstalled.
    Uninstalled { shop_domain: String },
}

impl EventOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        EventOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Processor
// =============================================================================

/// Ledger-driven pipeline for commerce events.
#[derive(Clone)]
pub struct EventProcessor {
    db: Database,
    clients: Arc<dyn ClientFactory>,
    mapper: LineMapper,
    reconciler: StockReconciler,
    meter: UsageMeter,
    replay: ReplaySettings,
}

impl EventProcessor {
    pub fn new(db: Database, clients: Arc<dyn ClientFactory>, replay: ReplaySettings) -> Self {
        EventProcessor {
            mapper: LineMapper::new(db.mappings()),
            reconciler: StockReconciler::new(db.clone(), clients.clone()),
            meter: UsageMeter::new(&db),
            db,
            clients,
            replay,
        }
    }

    /// The reconciler used for inventory events, shared with manual syncs.
    pub fn reconciler(&self) -> &StockReconciler {
        &self.reconciler
    }

    /// Handles one verified webhook delivery.
    ///
    /// ## Errors
    /// Only when the body cannot be parsed or the ledger cannot be reached.
    /// Pipeline failures are reported as [`EventOutcome::Failed`].
    pub async fn handle_webhook(
        &self,
        shop_domain: &str,
        topic: EventTopic,
        body: &str,
    ) -> SyncResult<EventOutcome> {
        if topic == EventTopic::AppUninstalled {
            let changed = self
                .db
                .shops()
                .mark_uninstalled(shop_domain, Utc::now())
                .await?;
            info!(shop_domain = %shop_domain, changed, "App uninstalled");
            return Ok(EventOutcome::Uninstalled {
                shop_domain: shop_domain.to_string(),
            });
        }

        let natural_id = natural_id(topic, body)?;

        let Some(shop) = self.db.shops().find_by_domain(shop_domain).await? else {
            debug!(shop_domain = %shop_domain, topic = %topic, "Event for unknown shop");
            return Ok(EventOutcome::ignored("unknown shop"));
        };
        if !shop.is_active() {
            debug!(shop_id = %shop.id, topic = %topic, "Event for inactive shop");
            return Ok(EventOutcome::ignored("shop is not active"));
        }
        if let Some(reason) = topic_ignored(&shop, topic) {
            debug!(shop_id = %shop.id, topic = %topic, reason, "Event ignored");
            return Ok(EventOutcome::ignored(reason));
        }

        let record = match self
            .db
            .events()
            .claim(&shop.id, topic, &natural_id, body)
            .await?
        {
            Claim::New(record) => record,
            Claim::Existing(record) if self.is_abandoned(&record) => {
                let cutoff = self.replay.stale_before(Utc::now());
                if !self
                    .db
                    .events()
                    .claim_for_retry(&record.id, record.retry_count, cutoff)
                    .await?
                {
                    return Ok(EventOutcome::Duplicate {
                        event_id: record.id,
                        status: EventStatus::Processing,
                    });
                }
                warn!(
                    shop_id = %shop.id,
                    topic = %topic,
                    natural_id = %natural_id,
                    status = ?record.status,
                    "Taking over abandoned event"
                );
                let mut record = record;
                record.retry_count += 1;
                return self.process(&shop, record).await;
            }
            Claim::Existing(record) => {
                info!(
                    shop_id = %shop.id,
                    topic = %topic,
                    natural_id = %natural_id,
                    status = ?record.status,
                    "Duplicate event"
                );
                return Ok(EventOutcome::Duplicate {
                    event_id: record.id,
                    status: record.status,
                });
            }
        };

        if !self.db.events().start_processing(&record.id).await? {
            return Ok(EventOutcome::Duplicate {
                event_id: record.id,
                status: EventStatus::Processing,
            });
        }

        self.process(&shop, record).await
    }

    /// A `pending`/`processing` row nobody has touched since the stale
    /// cutoff, with attempts left.
    fn is_abandoned(&self, record: &EventRecord) -> bool {
        matches!(record.status, EventStatus::Pending | EventStatus::Processing)
            && record.updated_at <= self.replay.stale_before(Utc::now())
            && record.retry_count < i64::from(self.replay.max_attempts)
    }

    /// Re-runs a ledger row already moved to `processing` by a retry claim.
    ///
    /// `record.retry_count` must count the replay being performed.
    pub async fn replay(&self, record: EventRecord) -> SyncResult<EventOutcome> {
        let shop = match self.db.shops().get(&record.shop_id).await {
            Ok(shop) => Some(shop),
            Err(DbError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        let Some(shop) = shop.filter(Shop::is_active) else {
            let reason = "shop is not active";
            self.db.events().fail(&record.id, reason, false, None).await?;
            return Ok(EventOutcome::Failed {
                event_id: record.id,
                error: reason.to_string(),
                retryable: false,
            });
        };

        info!(
            shop_id = %shop.id,
            topic = %record.topic,
            natural_id = %record.natural_id,
            attempt = record.retry_count,
            "Replaying event"
        );
        self.process(&shop, record).await
    }

    /// Moves a `processing` row to `failed` after a replay aborted outside
    /// the pipeline, so it is neither stranded nor lost.
    pub async fn fail_aborted(&self, record: &EventRecord, err: &SyncError) -> SyncResult<bool> {
        let retryable = err.is_retryable();
        let next_attempt_at = retryable.then(|| self.next_attempt_at(record.retry_count));
        Ok(self
            .db
            .events()
            .fail(&record.id, &err.to_string(), retryable, next_attempt_at)
            .await?)
    }

    fn next_attempt_at(&self, retry_count: i64) -> chrono::DateTime<Utc> {
        let wait = self.replay.backoff_for(retry_count);
        Utc::now()
            + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::seconds(3600))
    }

    async fn process(&self, shop: &Shop, record: EventRecord) -> SyncResult<EventOutcome> {
        match self.run_topic(shop, record.topic, &record.payload).await {
            Ok(result) => {
                self.db
                    .events()
                    .complete(&record.id, &result.to_string())
                    .await?;
                info!(
                    shop_id = %shop.id,
                    topic = %record.topic,
                    natural_id = %record.natural_id,
                    "Event completed"
                );
                Ok(EventOutcome::Completed {
                    event_id: record.id,
                    result,
                })
            }
            Err(err) => {
                let message = err.to_string();
                let retryable = err.is_retryable();
                let next_attempt_at = retryable.then(|| self.next_attempt_at(record.retry_count));

                warn!(
                    shop_id = %shop.id,
                    topic = %record.topic,
                    natural_id = %record.natural_id,
                    retryable,
                    error = %message,
                    "Event failed"
                );

                self.db
                    .events()
                    .fail(&record.id, &message, retryable, next_attempt_at)
                    .await?;
                let (title, entity_type) = failure_labels(record.topic);
                self.meter
                    .record_failure(&shop.id, title, message.clone(), entity_type, &record.natural_id)
                    .await;

                Ok(EventOutcome::Failed {
                    event_id: record.id,
                    error: message,
                    retryable,
                })
            }
        }
    }

    async fn run_topic(&self, shop: &Shop, topic: EventTopic, payload: &str) -> SyncResult<Value> {
        match topic {
            EventTopic::OrderCreated => {
                let order: CommerceOrder = serde_json::from_str(payload)?;
                self.issue_for_order(shop, &order).await
            }
            EventTopic::OrderCancelled => {
                let order: CommerceOrder = serde_json::from_str(payload)?;
                self.cancel_order(shop, &order).await
            }
            EventTopic::InventoryLevelUpdated => {
                let update: InventoryLevelUpdate = serde_json::from_str(payload)?;
                self.sync_inventory(shop, &update).await
            }
            EventTopic::AppUninstalled => Ok(json!({ "skipped": true })),
        }
    }

    // =========================================================================
    // orders/create
    // =========================================================================

    async fn issue_for_order(&self, shop: &Shop, order: &CommerceOrder) -> SyncResult<Value> {
        let documents = self.db.documents();
        if let Some(existing) = documents.find_live_for_order(&shop.id, order.id).await? {
            debug!(shop_id = %shop.id, order_id = order.id, "Order already has a document");
            return Ok(json!({ "document_id": existing.id, "skipped": true }));
        }

        let document_type = resolve_document_type(&shop.settings, order);
        let normalized = normalize_order(order)?;
        let lines = self.mapper.map_lines(shop, &order.line_items).await?;

        let issuer = DocumentIssuer::new(self.clients.fiscal(shop)?);
        let issued = issuer
            .issue(shop, document_type, &normalized, &lines)
            .await?;

        let now = Utc::now();
        let document = FiscalDocument {
            id: Uuid::new_v4().to_string(),
            shop_id: shop.id.clone(),
            commerce_order_id: normalized.order_id,
            commerce_order_name: normalized.order_name.clone(),
            document_type,
            tax_code: issued.tax_code,
            fiscal_document_id: Some(issued.fiscal_document_id),
            fiscal_number: issued.number,
            tax_id: normalized.tax_id.clone(),
            customer_name: normalized.customer_name(),
            customer_email: normalized.email.clone(),
            net_amount: normalized.net_amount,
            tax_amount: normalized.tax_amount,
            gross_amount: normalized.gross_amount,
            currency: normalized.currency.clone(),
            status: DocumentStatus::Generated,
            note: None,
            error_message: None,
            retry_count: 0,
            credit_note_id: None,
            credit_note_number: None,
            generated_at: Some(now),
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        match documents.insert(&document).await {
            Ok(()) => {}
            Err(DbError::UniqueViolation { .. }) => {
                warn!(
                    shop_id = %shop.id,
                    order_id = order.id,
                    fiscal_document_id = issued.fiscal_document_id,
                    "Order gained a live document while issuing; keeping the first"
                );
                return Ok(json!({
                    "skipped": true,
                    "orphan_fiscal_document_id": issued.fiscal_document_id,
                }));
            }
            Err(e) => return Err(e.into()),
        }

        self.meter
            .record(&shop.id, &UsageDelta::document_issued(document_type))
            .await;

        Ok(json!({
            "document_id": document.id,
            "document_type": document_type,
            "fiscal_document_id": issued.fiscal_document_id,
            "number": issued.number,
        }))
    }

    // =========================================================================
    // orders/cancelled
    // =========================================================================

    async fn cancel_order(&self, shop: &Shop, order: &CommerceOrder) -> SyncResult<Value> {
        let documents = self.db.documents();
        let Some(original) = documents.find_live_for_order(&shop.id, order.id).await? else {
            debug!(shop_id = %shop.id, order_id = order.id, "No live document to cancel");
            return Ok(json!({ "skipped": true, "reason": "no live document" }));
        };

        let fiscal_document_id = original
            .fiscal_document_id
            .ok_or(CoreError::MissingReference)?;
        let fiscal = self.clients.fiscal(shop)?;
        let remote = fiscal.get_document(fiscal_document_id).await?;
        let reference = CreditReference {
            fiscal_document_id,
            number: remote.number.or(original.fiscal_number),
            tax_code: original.tax_code,
        };

        let normalized = normalize_order(order)?;
        let lines = self.mapper.map_lines(shop, &order.line_items).await?;
        let credit_note = DocumentIssuer::new(fiscal)
            .issue_credit_note(shop, &normalized, &lines, &reference)
            .await?;

        let shown_number = credit_note
            .number
            .unwrap_or(credit_note.fiscal_document_id);
        let cancelled = documents
            .mark_cancelled(
                &original.id,
                &Cancellation {
                    credit_note_id: credit_note.fiscal_document_id,
                    credit_note_number: credit_note.number,
                    note: format!("Cancelled via credit note {shown_number}"),
                    cancelled_at: Utc::now(),
                },
            )
            .await?;
        if !cancelled {
            warn!(
                shop_id = %shop.id,
                document_id = %original.id,
                "Document was cancelled concurrently"
            );
        }

        self.meter
            .record(&shop.id, &UsageDelta::document_issued(DocumentType::CreditNote))
            .await;

        Ok(json!({
            "document_id": original.id,
            "credit_note_id": credit_note.fiscal_document_id,
            "credit_note_number": credit_note.number,
        }))
    }

    // =========================================================================
    // inventory_levels/update
    // =========================================================================

    async fn sync_inventory(&self, shop: &Shop, update: &InventoryLevelUpdate) -> SyncResult<Value> {
        let mapping = self
            .db
            .mappings()
            .find_by_inventory_item(&shop.id, update.inventory_item_id)
            .await?;
        let Some(mapping) = mapping.filter(|m| m.sync_stock && m.is_active) else {
            debug!(
                shop_id = %shop.id,
                inventory_item_id = update.inventory_item_id,
                "No stock-synced mapping for inventory item"
            );
            return Ok(json!({ "skipped": true, "reason": "no mapping" }));
        };

        let entry = self
            .reconciler
            .sync_mapping(
                shop,
                &mapping.id,
                SyncDirection::ToExternal,
                SyncSource::Event,
                Some(update.natural_id()),
            )
            .await?;

        Ok(json!({
            "log_entry_id": entry.id,
            "status": entry.status,
            "new_quantity": entry.new_quantity,
        }))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Deduplication key of a webhook body.
fn natural_id(topic: EventTopic, body: &str) -> SyncResult<String> {
    match topic {
        EventTopic::OrderCreated | EventTopic::OrderCancelled => {
            let order: CommerceOrder = serde_json::from_str(body)?;
            if order.id <= 0 {
                return Err(SyncError::Payload("order id is missing".to_string()));
            }
            Ok(order.id.to_string())
        }
        EventTopic::InventoryLevelUpdated => {
            let update: InventoryLevelUpdate = serde_json::from_str(body)?;
            Ok(update.natural_id())
        }
        EventTopic::AppUninstalled => Ok(String::new()),
    }
}

/// Reason a topic is not processed for `shop`, checked before the ledger.
fn topic_ignored(shop: &Shop, topic: EventTopic) -> Option<&'static str> {
    match topic {
        EventTopic::InventoryLevelUpdated if !shop.settings.sync_stock_enabled => {
            Some("stock sync disabled")
        }
        EventTopic::InventoryLevelUpdated
            if shop.settings.stock_sync_direction == SyncDirection::ToCommerce =>
        {
            Some("stock policy is to_commerce")
        }
        _ => None,
    }
}

fn failure_labels(topic: EventTopic) -> (&'static str, &'static str) {
    match topic {
        EventTopic::OrderCreated => ("Document generation failed", "order"),
        EventTopic::OrderCancelled => ("Credit note generation failed", "order"),
        EventTopic::InventoryLevelUpdated => ("Stock sync failed", "inventory_item"),
        EventTopic::AppUninstalled => ("Uninstall failed", "shop"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fakes::FakeClientFactory;
    use crate::test_support::{line, mapping, order, seeded_shop, test_db};
    use fiscal_core::{Address, NoteAttribute, SyncStatus};

    struct Fixture {
        db: Database,
        shop: Shop,
        fakes: FakeClientFactory,
        processor: EventProcessor,
    }

    /// Seeded shop with product 7 / variant 77 mapped to fiscal variant 70.
    async fn fixture() -> Fixture {
        let db = test_db().await;
        let shop = seeded_shop(&db).await;
        db.mappings()
            .insert(&mapping(&shop.id, 7, Some(77), 70))
            .await
            .unwrap();
        let fakes = FakeClientFactory::new();
        let processor =
            EventProcessor::new(db.clone(), Arc::new(fakes.clone()), ReplaySettings::default());
        Fixture {
            db,
            shop,
            fakes,
            processor,
        }
    }

    fn order_body(id: i64) -> String {
        serde_json::to_string(&order(id, vec![line(7, Some(77), 2, "9.95")])).unwrap()
    }

    async fn deliver(f: &Fixture, topic: EventTopic, body: &str) -> EventOutcome {
        f.processor
            .handle_webhook(&f.shop.domain, topic, body)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_order_issues_receipt_once() {
        let f = fixture().await;
        let body = order_body(5001);

        let first = deliver(&f, EventTopic::OrderCreated, &body).await;
        let EventOutcome::Completed { result, .. } = first else {
            panic!("expected completion, got {first:?}");
        };
        assert_eq!(result["fiscal_document_id"], 501);
        assert_eq!(result["number"], 1001);

        let second = deliver(&f, EventTopic::OrderCreated, &body).await;
        assert!(matches!(
            second,
            EventOutcome::Duplicate {
                status: EventStatus::Completed,
                ..
            }
        ));
        assert_eq!(f.fakes.fiscal.created().await.len(), 1);

        let doc = f
            .db
            .documents()
            .find_live_for_order(&f.shop.id, 5001)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.document_type, DocumentType::Receipt);
        assert_eq!(doc.tax_code, 39);
        assert_eq!(doc.fiscal_number, Some(1001));
        assert_eq!(doc.status, DocumentStatus::Generated);

        let counter = f.db.usage().current(&f.shop.id).await.unwrap().unwrap();
        assert_eq!(counter.orders_count, 1);
        assert_eq!(counter.receipts_count, 1);
    }

    #[tokio::test]
    async fn test_unmapped_order_fails_terminally() {
        let f = fixture().await;
        let body = serde_json::to_string(&order(5002, vec![line(8, None, 1, "5.00")])).unwrap();

        let outcome = deliver(&f, EventTopic::OrderCreated, &body).await;

        let EventOutcome::Failed { error, retryable, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(error, "no mapped items");
        assert!(!retryable);
        assert!(f.fakes.fiscal.created().await.is_empty());
        assert!(f
            .db
            .documents()
            .find_live_for_order(&f.shop.id, 5002)
            .await
            .unwrap()
            .is_none());

        let record = f
            .db
            .events()
            .find(&f.shop.id, EventTopic::OrderCreated, "5002")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, EventStatus::Failed);
        assert!(!record.retryable);
        assert_eq!(f.db.notifications().list_unread(&f.shop.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invoice_without_tax_id_falls_back_to_receipt() {
        let f = fixture().await;
        let mut settings = f.shop.settings.clone();
        settings.default_document_type = DocumentType::Invoice;
        settings.document_type_ids.insert(DocumentType::Invoice, 5);
        f.db.shops().update_settings(&f.shop.id, &settings).await.unwrap();

        let outcome = deliver(&f, EventTopic::OrderCreated, &order_body(5003)).await;

        assert!(matches!(outcome, EventOutcome::Completed { .. }));
        let created = f.fakes.fiscal.created().await;
        assert_eq!(created[0].document_type_id, 1);
    }

    #[tokio::test]
    async fn test_invoice_with_tax_id_is_issued() {
        let f = fixture().await;
        let mut settings = f.shop.settings.clone();
        settings.default_document_type = DocumentType::Invoice;
        settings.document_type_ids.insert(DocumentType::Invoice, 5);
        f.db.shops().update_settings(&f.shop.id, &settings).await.unwrap();

        let mut invoice_order = order(5004, vec![line(7, Some(77), 1, "10.00")]);
        invoice_order.note_attributes = vec![
            NoteAttribute {
                name: "rut".to_string(),
                value: "76.086.428-5".to_string(),
            },
            NoteAttribute {
                name: "giro".to_string(),
                value: "Comercio".to_string(),
            },
        ];
        invoice_order.billing_address = Some(Address {
            company: Some("Acme SpA".to_string()),
            address1: Some("Av. Siempre Viva 742".to_string()),
            ..Default::default()
        });
        let body = serde_json::to_string(&invoice_order).unwrap();

        let outcome = deliver(&f, EventTopic::OrderCreated, &body).await;

        let EventOutcome::Completed { result, .. } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(result["document_type"], "invoice");
        let doc = f
            .db
            .documents()
            .find_live_for_order(&f.shop.id, 5004)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.tax_code, 33);
        assert_eq!(doc.tax_id, "76.086.428-5");
    }

    #[tokio::test]
    async fn test_transient_failure_is_replayed() {
        let f = fixture().await;
        f.fakes.fiscal.fail_with_status(503).await;

        let outcome = deliver(&f, EventTopic::OrderCreated, &order_body(5005)).await;
        let EventOutcome::Failed { retryable, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(retryable);

        let record = f
            .db
            .events()
            .find(&f.shop.id, EventTopic::OrderCreated, "5005")
            .await
            .unwrap()
            .unwrap();
        assert!(record.next_attempt_at.is_some());

        f.fakes.fiscal.clear_failure().await;
        assert!(f
            .db
            .events()
            .claim_for_retry(&record.id, 0, Utc::now())
            .await
            .unwrap());
        let claimed = f.db.events().get(&record.id).await.unwrap();
        assert_eq!(claimed.retry_count, 1);

        let replayed = f.processor.replay(claimed).await.unwrap();
        assert!(matches!(replayed, EventOutcome::Completed { .. }));
        assert_eq!(f.fakes.fiscal.created().await.len(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_takes_over_abandoned_claim() {
        let f = fixture().await;
        let settings = ReplaySettings {
            stale_after_secs: 0,
            ..ReplaySettings::default()
        };
        let processor = EventProcessor::new(f.db.clone(), Arc::new(f.fakes.clone()), settings);
        let body = order_body(5010);

        // Claimed and moved to processing, then the process died.
        let id = f
            .db
            .events()
            .claim(&f.shop.id, EventTopic::OrderCreated, "5010", &body)
            .await
            .unwrap()
            .record()
            .id
            .clone();
        f.db.events().start_processing(&id).await.unwrap();

        let outcome = processor
            .handle_webhook(&f.shop.domain, EventTopic::OrderCreated, &body)
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Completed { .. }));
        assert_eq!(f.fakes.fiscal.created().await.len(), 1);

        let again = processor
            .handle_webhook(&f.shop.domain, EventTopic::OrderCreated, &body)
            .await
            .unwrap();
        assert!(matches!(
            again,
            EventOutcome::Duplicate {
                status: EventStatus::Completed,
                ..
            }
        ));
        assert_eq!(f.fakes.fiscal.created().await.len(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_claim_is_not_taken_over() {
        let f = fixture().await;
        let body = order_body(5011);
        let id = f
            .db
            .events()
            .claim(&f.shop.id, EventTopic::OrderCreated, "5011", &body)
            .await
            .unwrap()
            .record()
            .id
            .clone();
        f.db.events().start_processing(&id).await.unwrap();

        let outcome = deliver(&f, EventTopic::OrderCreated, &body).await;

        assert!(matches!(
            outcome,
            EventOutcome::Duplicate {
                status: EventStatus::Processing,
                ..
            }
        ));
        assert!(f.fakes.fiscal.created().await.is_empty());
    }

    #[tokio::test]
    async fn test_aborted_replay_is_marked_failed() {
        let f = fixture().await;
        let id = f
            .db
            .events()
            .claim(&f.shop.id, EventTopic::OrderCreated, "5012", &order_body(5012))
            .await
            .unwrap()
            .record()
            .id
            .clone();
        f.db.events().start_processing(&id).await.unwrap();
        let record = f.db.events().get(&id).await.unwrap();

        let err = SyncError::from(DbError::PoolExhausted);
        assert!(f.processor.fail_aborted(&record, &err).await.unwrap());

        let stored = f.db.events().get(&id).await.unwrap();
        assert_eq!(stored.status, EventStatus::Failed);
        assert!(stored.retryable);
        assert!(stored.next_attempt_at.is_some());
        assert!(stored.error_message.unwrap().contains("pool exhausted"));
    }

    #[tokio::test]
    async fn test_cancellation_issues_one_credit_note() {
        let f = fixture().await;
        let body = order_body(5006);
        deliver(&f, EventTopic::OrderCreated, &body).await;

        let first = deliver(&f, EventTopic::OrderCancelled, &body).await;
        let EventOutcome::Completed { result, .. } = first else {
            panic!("expected completion, got {first:?}");
        };
        assert_eq!(result["credit_note_number"], 1002);

        let second = deliver(&f, EventTopic::OrderCancelled, &body).await;
        assert!(matches!(second, EventOutcome::Duplicate { .. }));

        let created = f.fakes.fiscal.created().await;
        assert_eq!(created.len(), 2);
        assert_eq!(created[1].reference, Some(1001));
        assert_eq!(created[1].sii_code, Some(39));

        let docs = f.db.documents().list_for_order(&f.shop.id, 5006).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].status, DocumentStatus::Cancelled);
        assert_eq!(docs[0].note.as_deref(), Some("Cancelled via credit note 1002"));
        assert_eq!(docs[0].credit_note_id, Some(502));
    }

    #[tokio::test]
    async fn test_cancellation_without_document_is_noop() {
        let f = fixture().await;

        let outcome = deliver(&f, EventTopic::OrderCancelled, &order_body(5007)).await;

        let EventOutcome::Completed { result, .. } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(result["skipped"], true);
        assert!(f.fakes.fiscal.created().await.is_empty());
    }

    #[tokio::test]
    async fn test_inventory_update_pushes_to_fiscal() {
        let f = fixture().await;
        let mut settings = f.shop.settings.clone();
        settings.sync_stock_enabled = true;
        f.db.shops().update_settings(&f.shop.id, &settings).await.unwrap();
        f.fakes.commerce.set_level(700, 1, 14).await;

        let body = r#"{"inventory_item_id":700,"location_id":1,"available":14,"updated_at":"2026-10-19T10:00:00Z"}"#;
        let outcome = deliver(&f, EventTopic::InventoryLevelUpdated, body).await;

        assert!(matches!(outcome, EventOutcome::Completed { .. }));
        assert_eq!(f.fakes.fiscal.stock_writes().await, vec![(70, 1, 14)]);

        let logs = f.db.stock_logs().list_for_shop(&f.shop.id, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].source, SyncSource::Event);
        assert_eq!(logs[0].status, SyncStatus::Success);
        assert_eq!(logs[0].source_id.as_deref(), Some("700:1:2026-10-19T10:00:00Z"));
    }

    #[tokio::test]
    async fn test_inventory_update_ignored_when_sync_disabled() {
        let f = fixture().await;
        let body = r#"{"inventory_item_id":700,"location_id":1,"available":3}"#;

        let outcome = deliver(&f, EventTopic::InventoryLevelUpdated, body).await;

        assert_eq!(outcome, EventOutcome::ignored("stock sync disabled"));
        assert!(f.db.events().list_for_shop(&f.shop.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uninstalled_shop_is_ignored() {
        let f = fixture().await;

        let outcome = deliver(&f, EventTopic::AppUninstalled, "{}").await;
        assert!(matches!(outcome, EventOutcome::Uninstalled { .. }));

        let after = deliver(&f, EventTopic::OrderCreated, &order_body(5008)).await;
        assert_eq!(after, EventOutcome::ignored("shop is not active"));
    }

    #[tokio::test]
    async fn test_unknown_shop_is_ignored() {
        let f = fixture().await;

        let outcome = f
            .processor
            .handle_webhook("other.myshopify.com", EventTopic::OrderCreated, &order_body(1))
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::ignored("unknown shop"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_payload_error() {
        let f = fixture().await;

        let err = f
            .processor
            .handle_webhook(&f.shop.domain, EventTopic::OrderCreated, "not json")
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Payload(_)));
    }
}
