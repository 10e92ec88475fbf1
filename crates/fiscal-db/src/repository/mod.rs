//! # Repository Module
//!
//! One repository per table, all handed out by [`crate::Database`].
//!
//! ## Concurrency Primitives
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Shared mutable state is guarded by single-statement SQL, never by a   │
//! │  read-then-write in Rust:                                              │
//! │                                                                         │
//! │  EventRepository::claim        INSERT .. ON CONFLICT DO NOTHING         │
//! │  EventRepository::start_*      UPDATE .. WHERE status = <expected>      │
//! │  DocumentRepository::insert    partial UNIQUE index on live documents   │
//! │  DocumentRepository::mark_*    UPDATE .. WHERE status != 'cancelled'    │
//! │  MappingRepository::record_*   UPDATE .. WHERE last_synced_quantity IS ?│
//! │  UsageRepository::increment    INSERT .. ON CONFLICT DO UPDATE x = x+n  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`shop::ShopRepository`] - Installed shops and their settings
//! - [`mapping::MappingRepository`] - Commerce → fiscal catalog mappings
//! - [`event::EventRepository`] - Webhook event ledger
//! - [`document::DocumentRepository`] - Issued fiscal documents
//! - [`stock_log::StockLogRepository`] - Append-only stock sync log
//! - [`usage::UsageRepository`] - Monthly usage counters
//! - [`notification::NotificationRepository`] - Merchant notifications

pub mod document;
pub mod event;
pub mod mapping;
pub mod notification;
pub mod shop;
pub mod stock_log;
pub mod usage;
