//! # fiscal-sync: Issuance Pipeline and Stock Reconciliation
//!
//! Turns commerce events into fiscal documents and keeps stock aligned
//! between the commerce catalog and the fiscal catalog.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         fiscal-sync                                     │
//! │                                                                         │
//! │   webhook body                                                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌────────────────┐   ┌────────────────┐   ┌────────────────────────┐  │
//! │  │ EventProcessor │──►│  LineMapper    │──►│  DocumentIssuer        │  │
//! │  │                │   │                │   │                        │  │
//! │  │ ledger claim,  │   │ order lines →  │   │ per-type payloads,     │  │
//! │  │ topic routing, │   │ fiscal ids     │   │ credit notes           │  │
//! │  │ failure record │   └────────────────┘   └───────────┬────────────┘  │
//! │  └───────┬────────┘                                    │               │
//! │          │            ┌────────────────┐               ▼               │
//! │          └───────────►│StockReconciler │──►  FiscalApi / CommerceApi   │
//! │                       └────────────────┘     (reqwest, per shop)       │
//! │                                                                         │
//! │  ┌────────────────┐   ┌────────────────┐                               │
//! │  │ ReplayWorker   │   │  UsageMeter    │                               │
//! │  │ failed events, │   │ counters and   │                               │
//! │  │ backoff        │   │ notifications  │                               │
//! │  └────────────────┘   └────────────────┘                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`clients`] - Fiscal service and commerce platform clients
//! - [`config`] - `BridgeConfig` (TOML file + environment)
//! - [`error`] - Sync and client error types
//! - [`issuer`] - Document payload building and submission
//! - [`mapper`] - Order line → fiscal catalog mapping
//! - [`meter`] - Usage counters and notifications
//! - [`processor`] - Event ledger pipeline
//! - [`reconcile`] - Stock reconciliation engine
//! - [`replay`] - Background replay of failed events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fiscal_sync::{BridgeConfig, EventProcessor, HttpClientFactory, ReplayWorker};
//!
//! let config = BridgeConfig::load(None)?;
//! let clients = Arc::new(HttpClientFactory::new(&config)?);
//! let processor = EventProcessor::new(db.clone(), clients, config.replay.clone());
//!
//! let (worker, handle) = ReplayWorker::new(processor.clone(), db, config.replay.clone());
//! tokio::spawn(worker.run());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clients;
pub mod config;
pub mod error;
pub mod issuer;
pub mod mapper;
pub mod meter;
pub mod processor;
pub mod reconcile;
pub mod replay;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use clients::{ClientFactory, CommerceApi, FiscalApi, HttpClientFactory};
pub use config::BridgeConfig;
pub use error::{ClientError, SyncError, SyncResult};
pub use issuer::{discover_document_type_ids, DocumentIssuer};
pub use mapper::{LineMapper, MappedLine};
pub use meter::UsageMeter;
pub use processor::{EventOutcome, EventProcessor};
pub use reconcile::StockReconciler;
pub use replay::{ReplayStats, ReplayWorker, ReplayWorkerHandle};
