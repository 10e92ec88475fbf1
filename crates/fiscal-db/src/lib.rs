//! # fiscal-db: Database Layer for the Fiscal Bridge
//!
//! SQLite storage for shops, catalog mappings, the webhook event ledger,
//! issued documents, the stock sync log, usage counters and notifications.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Fiscal Bridge Data Flow                            │
//! │                                                                         │
//! │  Webhook (orders/create)                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  fiscal-sync EventProcessor                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    fiscal-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ EventRepo     │    │ 001_initial_ │  │   │
//! │  │   │ SqlitePool    │◄───│ DocumentRepo  │    │   schema.sql │  │   │
//! │  │   │               │    │ MappingRepo.. │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per table
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fiscal_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("bridge.db")).await?;
//! let shop = db.shops().find_by_domain("store.myshopify.com").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::document::{Cancellation, DocumentRepository};
pub use repository::event::{Claim, EventRepository};
pub use repository::mapping::MappingRepository;
pub use repository::notification::NotificationRepository;
pub use repository::shop::ShopRepository;
pub use repository::stock_log::StockLogRepository;
pub use repository::usage::UsageRepository;
