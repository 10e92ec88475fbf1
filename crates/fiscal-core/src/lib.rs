//! # fiscal-core: Pure Business Logic for the Fiscal Bridge
//!
//! Everything here is a pure function over plain data: no database, no
//! network, no clock reads.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Fiscal Bridge Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                bridge-server (axum webhooks)                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        fiscal-sync (processor, issuer, reconciler, clients)     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ fiscal-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌───────────┐ ┌──────────┐         │   │
//! │  │   │  tax_id  │ │ resolver │ │ transform │ │  stock   │         │   │
//! │  │   │ mod-11   │ │ doc type │ │ normalize │ │ planning │         │   │
//! │  │   └──────────┘ └──────────┘ └───────────┘ └──────────┘         │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌───────────┐                      │   │
//! │  │   │  types   │ │  money   │ │  catalog  │                      │   │
//! │  │   └──────────┘ └──────────┘ └───────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  fiscal-db (SQLite repositories)                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records and enums
//! - [`money`] - Integer minor-unit money, parsed without rounding
//! - [`tax_id`] - Check-character validation and formatting
//! - [`resolver`] - Document class selection with tax ID fallback
//! - [`transform`] - Order normalization
//! - [`catalog`] - Document type id discovery (setup aid)
//! - [`stock`] - Bidirectional stock sync planning
//! - [`error`] - Domain error types

pub mod catalog;
pub mod error;
pub mod money;
pub mod resolver;
pub mod stock;
pub mod tax_id;
pub mod transform;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

/// Reason recorded when no order line maps to a fiscal item.
pub const NO_MAPPED_ITEMS: &str = "no mapped items";
