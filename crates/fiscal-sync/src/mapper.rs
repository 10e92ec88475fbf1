//! # Line Item Mapper
//!
//! Resolves each order line to a fiscal catalog id through the shop's
//! catalog mappings.
//!
//! ```text
//! line (product_id, variant_id) ──► MappingRepository::find_for_line
//!        │                                   │
//!        │ no product / no active mapping    │ found
//!        ▼                                   ▼
//!    skipped (debug log)              MappedLine { fiscal id, qty, price }
//!
//! all skipped                        ──► Incomplete("no mapped items")
//! require_all_items_mapped && any    ──► Incomplete("unmapped items: ...")
//! ```

use tracing::debug;

use fiscal_core::transform::{line_discount, line_unit_price};
use fiscal_core::{LineItem, Money, Shop, NO_MAPPED_ITEMS};
use fiscal_db::MappingRepository;

use crate::error::{SyncError, SyncResult};

/// An order line resolved to the fiscal catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedLine {
    /// Fiscal variant id (or item id when the mapping has no variant).
    pub fiscal_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
    /// Total discount amount of the line.
    pub discount: Money,
    pub comment: String,
}

impl MappedLine {
    /// Line discount as a percentage of `unit_price * quantity`, rounded to
    /// two decimals.
    pub fn discount_percent(&self) -> f64 {
        let Ok(gross) = self.unit_price.multiply_quantity(self.quantity) else {
            return 0.0;
        };
        let gross = gross.minor();
        if gross <= 0 || self.discount.is_zero() {
            return 0.0;
        }
        let percent = self.discount.minor() as f64 * 100.0 / gross as f64;
        (percent * 100.0).round() / 100.0
    }
}

/// Maps order lines for one shop.
#[derive(Debug, Clone)]
pub struct LineMapper {
    mappings: MappingRepository,
}

impl LineMapper {
    pub fn new(mappings: MappingRepository) -> Self {
        LineMapper { mappings }
    }

    /// Maps `items`, skipping lines without an active mapping.
    ///
    /// ## Errors
    /// - [`SyncError::Incomplete`] when nothing maps, or when the shop
    ///   requires every line to map and some do not
    /// - amount parse errors of mapped lines
    pub async fn map_lines(&self, shop: &Shop, items: &[LineItem]) -> SyncResult<Vec<MappedLine>> {
        let mut mapped = Vec::with_capacity(items.len());
        let mut unmapped = Vec::new();

        for item in items {
            let mapping = match item.product_id {
                Some(product_id) => {
                    self.mappings
                        .find_for_line(&shop.id, product_id, item.variant_id)
                        .await?
                }
                None => None,
            };

            let Some(mapping) = mapping else {
                debug!(
                    shop_id = %shop.id,
                    line_id = item.id,
                    product_id = ?item.product_id,
                    variant_id = ?item.variant_id,
                    "Skipping unmapped line"
                );
                unmapped.push(item.sku.clone().unwrap_or_else(|| item.label().to_string()));
                continue;
            };

            let unit_price = line_unit_price(item)?;
            // Rejects lines whose total cannot be represented.
            unit_price.multiply_quantity(item.quantity)?;

            mapped.push(MappedLine {
                fiscal_id: mapping.fiscal_line_id(),
                quantity: item.quantity,
                unit_price,
                discount: line_discount(item)?,
                comment: item.label().to_string(),
            });
        }

        if mapped.is_empty() {
            return Err(SyncError::Incomplete(NO_MAPPED_ITEMS.to_string()));
        }
        if shop.settings.require_all_items_mapped && !unmapped.is_empty() {
            return Err(SyncError::Incomplete(format!(
                "unmapped items: {}",
                unmapped.join(", ")
            )));
        }

        Ok(mapped)
    }
}
