//! # Domain Types
//!
//! Core domain types shared by the database layer, the sync pipeline and the
//! webhook server.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  INBOUND (commerce, immutable)      PERSISTED (SQLite)                  │
//! │  ┌─────────────────┐                ┌─────────────────┐                │
//! │  │ CommerceOrder   │                │ Shop            │                │
//! │  │  line_items     │                │  settings       │                │
//! │  │  customer       │                ├─────────────────┤                │
//! │  │  billing_address│                │ CatalogMapping  │                │
//! │  │  note_attributes│                │ FiscalDocument  │                │
//! │  └─────────────────┘                │ EventRecord     │                │
//! │  ┌─────────────────┐                │ StockSyncLogEntry│               │
//! │  │ InventoryLevel  │                │ UsageCounter    │                │
//! │  │  Update         │                │ Notification    │                │
//! │  └─────────────────┘                └─────────────────┘                │
//! │                                                                         │
//! │  ENUMS: DocumentType, DocumentStatus, EventTopic, EventStatus,         │
//! │         SyncDirection, SyncSource, SyncStatus, NotificationKind        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Persisted records use a UUID v4 string `id`. Commerce and fiscal ids are
//! the numeric ids those systems hand out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Document Type
// =============================================================================

/// Class of fiscal document issued through the fiscal service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Consumer receipt. Tax ID optional.
    Receipt,
    /// Business invoice. Requires a valid tax ID and company block.
    Invoice,
    /// Non-tax sales note.
    SalesNote,
    /// Compensating document for a cancelled order.
    CreditNote,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        DocumentType::Receipt,
        DocumentType::Invoice,
        DocumentType::SalesNote,
        DocumentType::CreditNote,
    ];

    /// Stable lowercase name used in storage, config and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Receipt => "receipt",
            DocumentType::Invoice => "invoice",
            DocumentType::SalesNote => "sales_note",
            DocumentType::CreditNote => "credit_note",
        }
    }

    /// Tax authority class code for this document.
    pub const fn tax_code(&self) -> i64 {
        match self {
            DocumentType::Receipt => 39,
            DocumentType::Invoice => 33,
            DocumentType::SalesNote => 41,
            DocumentType::CreditNote => 61,
        }
    }

    /// Whether issuance requires a valid customer tax ID.
    pub const fn requires_tax_id(&self) -> bool {
        matches!(self, DocumentType::Invoice)
    }
}

impl Default for DocumentType {
    fn default() -> Self {
        DocumentType::Receipt
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "document_type".to_string(),
                allowed: DocumentType::ALL
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect(),
            })
    }
}

// =============================================================================
// Document Status
// =============================================================================

/// Lifecycle of a persisted fiscal document.
///
/// ```text
/// pending ──► generated ──► [sent] ──► cancelled
///    │
///    └──────► error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Generated,
    Sent,
    Error,
    Cancelled,
}

// =============================================================================
// Event Topic / Event Status
// =============================================================================

/// Inbound commerce webhook topics handled by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum EventTopic {
    #[serde(rename = "orders/create")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "orders/create"))]
    OrderCreated,
    #[serde(rename = "orders/cancelled")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "orders/cancelled"))]
    OrderCancelled,
    #[serde(rename = "inventory_levels/update")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "inventory_levels/update"))]
    InventoryLevelUpdated,
    #[serde(rename = "app/uninstalled")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "app/uninstalled"))]
    AppUninstalled,
}

impl EventTopic {
    /// Topic string exactly as the commerce platform sends it.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventTopic::OrderCreated => "orders/create",
            EventTopic::OrderCancelled => "orders/cancelled",
            EventTopic::InventoryLevelUpdated => "inventory_levels/update",
            EventTopic::AppUninstalled => "app/uninstalled",
        }
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing state of an [`EventRecord`].
///
/// ```text
/// pending ──► processing ──► completed
///                  │
///                  └──────► failed ──(replay worker)──► processing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

// =============================================================================
// Stock Sync Enums
// =============================================================================

/// Direction of a stock reconciliation.
///
/// Used both as the per-shop policy and as the requested direction of a
/// single run. Log entries always record the leg actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Commerce quantity is pushed to the fiscal catalog.
    ToExternal,
    /// Fiscal quantity is pushed to the commerce catalog.
    ToCommerce,
    Bidirectional,
}

impl SyncDirection {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::ToExternal => "to_external",
            SyncDirection::ToCommerce => "to_commerce",
            SyncDirection::Bidirectional => "bidirectional",
        }
    }
}

impl Default for SyncDirection {
    fn default() -> Self {
        SyncDirection::Bidirectional
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What triggered a stock reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    Manual,
    Event,
}

/// Outcome recorded on a [`StockSyncLogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Skipped,
    Error,
}

/// Severity of a [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Error,
    Warning,
    Info,
    Success,
}

// =============================================================================
// Commerce Order (inbound webhook payload)
// =============================================================================

/// Order as delivered by the commerce platform's `orders/*` webhooks.
///
/// Only the fields the pipeline reads are modelled; everything else in the
/// payload is ignored. Amounts stay as strings until [`crate::transform`]
/// parses them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommerceOrder {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub order_number: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub total_price: Option<String>,
    /// Line subtotal after discounts, before shipping.
    #[serde(default)]
    pub subtotal_price: Option<String>,
    #[serde(default)]
    pub total_tax: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub note_attributes: Vec<NoteAttribute>,
}

impl CommerceOrder {
    /// Looks up a note attribute by case-insensitive name, ignoring blanks.
    pub fn note_attribute(&self, names: &[&str]) -> Option<&str> {
        self.note_attributes
            .iter()
            .find(|attr| names.iter().any(|n| attr.name.eq_ignore_ascii_case(n)))
            .map(|attr| attr.value.trim())
            .filter(|v| !v.is_empty())
    }
}

/// One line of a [`CommerceOrder`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub variant_id: Option<i64>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub name: Option<String>,
    pub quantity: i64,
    pub price: String,
    #[serde(default)]
    pub total_discount: Option<String>,
}

impl LineItem {
    /// Human-readable label, preferring the variant-qualified name.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub default_address: Option<Address>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteAttribute {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Payload of the `inventory_levels/update` webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryLevelUpdate {
    pub inventory_item_id: i64,
    pub location_id: i64,
    #[serde(default)]
    pub available: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl InventoryLevelUpdate {
    /// Natural key for deduplication: one record per observed level change.
    pub fn natural_id(&self) -> String {
        format!(
            "{}:{}:{}",
            self.inventory_item_id,
            self.location_id,
            self.updated_at.as_deref().unwrap_or("")
        )
    }
}

// =============================================================================
// Shop
// =============================================================================

/// Per-shop behaviour switches, stored as JSON on the shop row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopSettings {
    /// Document class issued for new orders.
    pub default_document_type: DocumentType,
    /// Issued instead of the default when it needs a tax ID the order lacks.
    pub fallback_document_type: DocumentType,
    /// Explicit document class → fiscal service document type id.
    pub document_type_ids: BTreeMap<DocumentType, i64>,
    pub sync_stock_enabled: bool,
    pub stock_sync_direction: SyncDirection,
    /// Abort issuance when any line is unmapped instead of skipping it.
    pub require_all_items_mapped: bool,
}

impl Default for ShopSettings {
    fn default() -> Self {
        ShopSettings {
            default_document_type: DocumentType::Receipt,
            fallback_document_type: DocumentType::Receipt,
            document_type_ids: BTreeMap::new(),
            sync_stock_enabled: false,
            stock_sync_direction: SyncDirection::Bidirectional,
            require_all_items_mapped: false,
        }
    }
}

impl ShopSettings {
    /// Validates settings before they are persisted.
    ///
    /// ## Rules
    /// - Neither the default nor the fallback may be a credit note
    /// - The fallback must not itself require a tax ID
    /// - Configured document type ids must be positive
    pub fn validate(&self) -> Result<(), ValidationError> {
        let issuable: Vec<String> = [
            DocumentType::Receipt,
            DocumentType::Invoice,
            DocumentType::SalesNote,
        ]
        .iter()
        .map(|t| t.as_str().to_string())
        .collect();

        if self.default_document_type == DocumentType::CreditNote {
            return Err(ValidationError::NotAllowed {
                field: "default_document_type".to_string(),
                allowed: issuable,
            });
        }
        if self.fallback_document_type == DocumentType::CreditNote
            || self.fallback_document_type.requires_tax_id()
        {
            return Err(ValidationError::NotAllowed {
                field: "fallback_document_type".to_string(),
                allowed: vec!["receipt".to_string(), "sales_note".to_string()],
            });
        }
        for (doc_type, id) in &self.document_type_ids {
            if *id <= 0 {
                return Err(ValidationError::MustBePositive {
                    field: format!("document_type_ids.{doc_type}"),
                });
            }
        }
        Ok(())
    }

    /// Document classes that must have a configured type id before the shop
    /// can issue anything.
    pub fn required_document_types(&self) -> Vec<DocumentType> {
        let mut required = vec![
            self.default_document_type,
            self.fallback_document_type,
            DocumentType::CreditNote,
        ];
        required.sort();
        required.dedup();
        required
    }

    /// Whether the shop policy permits a reconciliation in `direction`.
    pub fn allows_direction(&self, direction: SyncDirection) -> bool {
        match self.stock_sync_direction {
            SyncDirection::Bidirectional => true,
            policy => policy == direction,
        }
    }
}

/// An installed commerce shop with its fiscal service credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Shop {
    pub id: String,
    pub domain: String,
    #[serde(skip_serializing)]
    pub commerce_access_token: String,
    pub commerce_location_id: Option<i64>,
    #[serde(skip_serializing)]
    pub fiscal_api_token: String,
    pub fiscal_branch_id: Option<i64>,
    pub fiscal_warehouse_id: Option<i64>,
    pub is_configured: bool,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub settings: ShopSettings,
    pub installed_at: DateTime<Utc>,
    pub uninstalled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Shop {
    /// Whether events for this shop should be processed at all.
    pub fn is_active(&self) -> bool {
        self.is_configured && self.uninstalled_at.is_none()
    }

    /// Validates the shop before it is persisted.
    ///
    /// A configured shop must carry a fiscal token, a branch and a type id
    /// for every document class it may issue.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.domain.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "domain".to_string(),
            });
        }
        self.settings.validate()?;

        if !self.is_configured {
            return Ok(());
        }
        if self.fiscal_api_token.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "fiscal_api_token".to_string(),
            });
        }
        if self.fiscal_branch_id.is_none() {
            return Err(ValidationError::Required {
                field: "fiscal_branch_id".to_string(),
            });
        }
        for doc_type in self.settings.required_document_types() {
            if !self.settings.document_type_ids.contains_key(&doc_type) {
                return Err(ValidationError::Required {
                    field: format!("document_type_ids.{doc_type}"),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Catalog Mapping
// =============================================================================

/// Association between a commerce product/variant and a fiscal catalog item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CatalogMapping {
    pub id: String,
    pub shop_id: String,
    pub commerce_product_id: i64,
    pub commerce_variant_id: Option<i64>,
    pub commerce_inventory_item_id: Option<i64>,
    pub commerce_sku: Option<String>,
    pub fiscal_item_id: i64,
    pub fiscal_variant_id: Option<i64>,
    pub sync_stock: bool,
    pub sync_price: bool,
    pub is_active: bool,
    pub last_synced_quantity: Option<i64>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogMapping {
    /// Id used for fiscal document lines and stock calls: the variant when
    /// mapped, otherwise the item itself.
    pub fn fiscal_line_id(&self) -> i64 {
        self.fiscal_variant_id.unwrap_or(self.fiscal_item_id)
    }
}

// =============================================================================
// Fiscal Document
// =============================================================================

/// A fiscal document issued for a commerce order.
///
/// At most one non-cancelled document exists per (shop, order). Cancellation
/// records the compensating credit note on the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FiscalDocument {
    pub id: String,
    pub shop_id: String,
    pub commerce_order_id: i64,
    pub commerce_order_name: String,
    pub document_type: DocumentType,
    pub tax_code: i64,
    pub fiscal_document_id: Option<i64>,
    pub fiscal_number: Option<i64>,
    pub tax_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub net_amount: Money,
    pub tax_amount: Money,
    pub gross_amount: Money,
    pub currency: String,
    pub status: DocumentStatus,
    pub note: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub credit_note_id: Option<i64>,
    pub credit_note_number: Option<i64>,
    pub generated_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Event Record
// =============================================================================

/// Ledger row for one inbound event, keyed by (shop, topic, natural id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct EventRecord {
    pub id: String,
    pub shop_id: String,
    pub topic: EventTopic,
    pub natural_id: String,
    pub status: EventStatus,
    /// Raw webhook body, kept for replay.
    pub payload: String,
    /// JSON reference to what the event produced.
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub retryable: bool,
    pub retry_count: i64,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Stock Sync Log
// =============================================================================

/// Append-only record of a single reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockSyncLogEntry {
    pub id: String,
    pub shop_id: String,
    pub mapping_id: Option<String>,
    pub direction: SyncDirection,
    pub previous_quantity: Option<i64>,
    pub new_quantity: Option<i64>,
    pub delta: Option<i64>,
    pub source: SyncSource,
    pub source_id: Option<String>,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Usage
// =============================================================================

/// Per-shop, per-month counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UsageCounter {
    pub shop_id: String,
    pub year: i64,
    pub month: i64,
    pub orders_count: i64,
    pub documents_count: i64,
    pub receipts_count: i64,
    pub invoices_count: i64,
    pub sales_notes_count: i64,
    pub credit_notes_count: i64,
    pub stock_syncs_count: i64,
    pub errors_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// Additive increments applied to a [`UsageCounter`] in one statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageDelta {
    pub orders: i64,
    pub documents: i64,
    pub receipts: i64,
    pub invoices: i64,
    pub sales_notes: i64,
    pub credit_notes: i64,
    pub stock_syncs: i64,
    pub errors: i64,
}

impl UsageDelta {
    /// One processed order that produced a document of `doc_type`.
    pub fn document_issued(doc_type: DocumentType) -> Self {
        let mut delta = UsageDelta {
            documents: 1,
            ..Default::default()
        };
        match doc_type {
            DocumentType::Receipt => delta.receipts = 1,
            DocumentType::Invoice => delta.invoices = 1,
            DocumentType::SalesNote => delta.sales_notes = 1,
            DocumentType::CreditNote => delta.credit_notes = 1,
        }
        if doc_type != DocumentType::CreditNote {
            delta.orders = 1;
        }
        delta
    }

    pub fn stock_sync() -> Self {
        UsageDelta {
            stock_syncs: 1,
            ..Default::default()
        }
    }

    pub fn error() -> Self {
        UsageDelta {
            errors: 1,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == UsageDelta::default()
    }
}

// =============================================================================
// Notification
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Notification {
    pub id: String,
    pub shop_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification content before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        NewNotification {
            kind,
            title: title.into(),
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        NewNotification::new(NotificationKind::Error, title, message)
    }

    /// Attaches the entity the notification is about.
    pub fn about(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_codes() {
        assert_eq!(DocumentType::Receipt.tax_code(), 39);
        assert_eq!(DocumentType::Invoice.tax_code(), 33);
        assert_eq!(DocumentType::SalesNote.tax_code(), 41);
        assert_eq!(DocumentType::CreditNote.tax_code(), 61);
        assert!(DocumentType::Invoice.requires_tax_id());
        assert!(!DocumentType::Receipt.requires_tax_id());
    }

    #[test]
    fn test_document_type_parse() {
        assert_eq!("sales_note".parse::<DocumentType>().unwrap(), DocumentType::SalesNote);
        assert!("boleta".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: ShopSettings = serde_json::from_str(
            r#"{"default_document_type":"invoice","document_type_ids":{"invoice":2,"receipt":1}}"#,
        )
        .unwrap();
        assert_eq!(settings.default_document_type, DocumentType::Invoice);
        assert_eq!(settings.fallback_document_type, DocumentType::Receipt);
        assert_eq!(settings.document_type_ids.get(&DocumentType::Invoice), Some(&2));
        assert_eq!(settings.stock_sync_direction, SyncDirection::Bidirectional);
        assert!(!settings.sync_stock_enabled);
    }

    #[test]
    fn test_settings_reject_invoice_fallback() {
        let settings = ShopSettings {
            default_document_type: DocumentType::Invoice,
            fallback_document_type: DocumentType::Invoice,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_reject_credit_note_default() {
        let settings = ShopSettings {
            default_document_type: DocumentType::CreditNote,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_required_document_types_dedup() {
        let settings = ShopSettings::default();
        assert_eq!(
            settings.required_document_types(),
            vec![DocumentType::Receipt, DocumentType::CreditNote]
        );
    }

    #[test]
    fn test_direction_policy() {
        let mut settings = ShopSettings::default();
        assert!(settings.allows_direction(SyncDirection::ToExternal));
        settings.stock_sync_direction = SyncDirection::ToCommerce;
        assert!(settings.allows_direction(SyncDirection::ToCommerce));
        assert!(!settings.allows_direction(SyncDirection::ToExternal));
        assert!(!settings.allows_direction(SyncDirection::Bidirectional));
    }

    #[test]
    fn test_order_deserializes_from_webhook_body() {
        let order: CommerceOrder = serde_json::from_str(
            r##"{
                "id": 820982911946154508,
                "name": "#1001",
                "currency": "CLP",
                "total_price": "11900.00",
                "line_items": [
                    {"id": 1, "product_id": 7, "variant_id": null, "sku": "TSHIRT",
                     "title": "T-Shirt", "quantity": 2, "price": "5950.00"}
                ],
                "note_attributes": [{"name": "RUT", "value": "12.345.678-5"}],
                "unknown_field": true
            }"##,
        )
        .unwrap();
        assert_eq!(order.line_items.len(), 1);
        assert_eq!(order.line_items[0].variant_id, None);
        assert_eq!(order.note_attribute(&["rut"]), Some("12.345.678-5"));
    }

    #[test]
    fn test_usage_delta_for_document() {
        let delta = UsageDelta::document_issued(DocumentType::Invoice);
        assert_eq!(delta.orders, 1);
        assert_eq!(delta.documents, 1);
        assert_eq!(delta.invoices, 1);
        assert_eq!(delta.receipts, 0);

        let credit = UsageDelta::document_issued(DocumentType::CreditNote);
        assert_eq!(credit.orders, 0);
        assert_eq!(credit.credit_notes, 1);
        assert!(UsageDelta::default().is_empty());
    }

    #[test]
    fn test_inventory_natural_id() {
        let update = InventoryLevelUpdate {
            inventory_item_id: 42,
            location_id: 7,
            available: Some(3),
            updated_at: Some("2024-05-01T10:00:00-04:00".to_string()),
        };
        assert_eq!(update.natural_id(), "42:7:2024-05-01T10:00:00-04:00");
    }
}
