//! # Document Type Resolver
//!
//! Decides which document class an order gets.
//!
//! ```text
//! settings.default_document_type
//!        │
//!        ├── requires tax ID? ── no ──────────────────────► default
//!        │
//!        └── yes ──► extract_tax_id(order) valid? ── yes ─► default
//!                                          │
//!                                          └──── no ─────► fallback
//! ```
//!
//! Pure and deterministic, so a replayed event resolves exactly as the
//! first delivery did.

use crate::tax_id;
use crate::types::{CommerceOrder, DocumentType, ShopSettings};

/// Note attribute names that carry the customer's tax ID.
pub const TAX_ID_ATTRIBUTES: [&str; 2] = ["rut", "tax_id"];

/// Extracts the raw (unvalidated) tax ID candidate from an order.
///
/// Lookup order: note attribute, customer default address company, billing
/// address company. Company fields only yield pattern matches.
pub fn extract_tax_id(order: &CommerceOrder) -> Option<String> {
    if let Some(value) = order.note_attribute(&TAX_ID_ATTRIBUTES) {
        return Some(value.to_string());
    }

    let customer_company = order
        .customer
        .as_ref()
        .and_then(|c| c.default_address.as_ref())
        .and_then(|a| a.company.as_deref());
    let billing_company = order
        .billing_address
        .as_ref()
        .and_then(|a| a.company.as_deref());

    [customer_company, billing_company]
        .into_iter()
        .flatten()
        .find_map(tax_id::find_candidate)
        .map(str::to_string)
}

/// Resolves the document class to issue for `order`.
pub fn resolve_document_type(settings: &ShopSettings, order: &CommerceOrder) -> DocumentType {
    let default = settings.default_document_type;
    if !default.requires_tax_id() {
        return default;
    }

    let has_valid_tax_id = extract_tax_id(order)
        .map(|id| tax_id::is_valid(&id))
        .unwrap_or(false);

    if has_valid_tax_id {
        default
    } else {
        settings.fallback_document_type
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
