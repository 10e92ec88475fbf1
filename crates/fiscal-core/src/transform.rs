//! # Order Transformer
//!
//! Flattens a [`CommerceOrder`] into the fields a fiscal document needs.
//! Every text field resolves to a string; downstream code never sees a
//! missing customer field.
//!
//! ## Fallback Chains
//! ```text
//! first/last name : customer ──► billing address ──► default address ──► ""
//! email           : customer ──► order ──────────────────────────────► ""
//! company/address : billing address ──► customer default address ────► ""
//! phone           : customer ──► billing address ──► order ──────────► ""
//! tax id          : resolver::extract_tax_id, kept only when valid
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::resolver;
use crate::tax_id::TaxId;
use crate::types::{Address, CommerceOrder, LineItem};

/// Note attribute names that carry the business activity (giro).
pub const ACTIVITY_ATTRIBUTES: [&str; 2] = ["activity", "giro"];

/// Normalized view of an order, ready for payload building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedOrder {
    pub order_id: i64,
    pub order_name: String,
    pub order_number: Option<i64>,
    /// Canonical dotted tax ID, or empty when absent/invalid.
    pub tax_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: String,
    pub activity: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub currency: String,
    pub net_amount: Money,
    pub tax_amount: Money,
    pub gross_amount: Money,
}

impl NormalizedOrder {
    pub fn customer_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn has_tax_id(&self) -> bool {
        !self.tax_id.is_empty()
    }
}

/// Picks the first non-blank value.
fn first_present<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn address_field<'a>(
    address: Option<&'a Address>,
    get: impl Fn(&'a Address) -> Option<&'a str>,
) -> Option<&'a str> {
    address.and_then(get)
}

fn parse_amount(field: &str, raw: Option<&str>) -> Result<Money, ValidationError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Money::zero()),
        Some(text) => Money::parse_decimal(field, text),
    }
}

/// Parses a line's unit price.
pub fn line_unit_price(item: &LineItem) -> Result<Money, ValidationError> {
    Money::parse_decimal("line_items.price", &item.price)
}

/// Parses a line's total discount amount (zero when absent).
pub fn line_discount(item: &LineItem) -> Result<Money, ValidationError> {
    parse_amount("line_items.total_discount", item.total_discount.as_deref())
}

/// Normalizes `order`.
///
/// ## Errors
/// - [`ValidationError::Required`] when the order id is missing (zero)
/// - amount parse errors; missing amounts are zero
pub fn normalize_order(order: &CommerceOrder) -> Result<NormalizedOrder, ValidationError> {
    if order.id <= 0 {
        return Err(ValidationError::Required {
            field: "order.id".to_string(),
        });
    }

    let customer = order.customer.as_ref();
    let billing = order.billing_address.as_ref();
    let default_address = customer.and_then(|c| c.default_address.as_ref());

    let tax_id = resolver::extract_tax_id(order)
        .and_then(|raw| TaxId::parse(&raw).ok())
        .map(|id| id.to_string())
        .unwrap_or_default();

    let gross_amount = parse_amount("total_price", order.total_price.as_deref())?;
    let tax_amount = parse_amount("total_tax", order.total_tax.as_deref())?;
    let net_amount = match order.subtotal_price.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Money::parse_decimal("subtotal_price", text)?,
        _ => gross_amount
            .checked_sub(tax_amount)
            .map_err(|_| ValidationError::invalid("total_tax", "out of range"))?,
    };

    Ok(NormalizedOrder {
        order_id: order.id,
        order_name: first_present([Some(order.name.as_str())]),
        order_number: order.order_number,
        tax_id,
        first_name: first_present([
            customer.and_then(|c| c.first_name.as_deref()),
            address_field(billing, |a| a.first_name.as_deref()),
            address_field(default_address, |a| a.first_name.as_deref()),
        ]),
        last_name: first_present([
            customer.and_then(|c| c.last_name.as_deref()),
            address_field(billing, |a| a.last_name.as_deref()),
            address_field(default_address, |a| a.last_name.as_deref()),
        ]),
        email: first_present([
            customer.and_then(|c| c.email.as_deref()),
            order.email.as_deref(),
        ]),
        company: first_present([
            address_field(billing, |a| a.company.as_deref()),
            address_field(default_address, |a| a.company.as_deref()),
        ]),
        activity: first_present([order.note_attribute(&ACTIVITY_ATTRIBUTES)]),
        address: first_present([
            address_field(billing, |a| a.address1.as_deref()),
            address_field(default_address, |a| a.address1.as_deref()),
        ]),
        city: first_present([
            address_field(billing, |a| a.city.as_deref()),
            address_field(default_address, |a| a.city.as_deref()),
        ]),
        phone: first_present([
            customer.and_then(|c| c.phone.as_deref()),
            address_field(billing, |a| a.phone.as_deref()),
            order.phone.as_deref(),
        ]),
        currency: first_present([order.currency.as_deref()]),
        net_amount,
        tax_amount,
        gross_amount,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Customer, NoteAttribute};

    fn full_order() -> CommerceOrder {
        CommerceOrder {
            id: 5001,
            name: "#1001".to_string(),
            order_number: Some(1001),
            email: Some("order@example.cl".to_string()),
            currency: Some("CLP".to_string()),
            total_price: Some("11900.00".to_string()),
            total_tax: Some("1900.00".to_string()),
            customer: Some(Customer {
                first_name: Some("Ana".to_string()),
                last_name: Some("".to_string()),
                email: None,
                phone: None,
                default_address: Some(Address {
                    company: Some("Andes SpA".to_string()),
                    address1: Some("Av. Siempre Viva 742".to_string()),
                    city: Some("Valparaíso".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            billing_address: Some(Address {
                last_name: Some("Rojas".to_string()),
                city: Some("Santiago".to_string()),
                phone: Some("+56 9 1234 5678".to_string()),
                ..Default::default()
            }),
            note_attributes: vec![
                NoteAttribute {
                    name: "rut".to_string(),
                    value: "123456785".to_string(),
                },
                NoteAttribute {
                    name: "Giro".to_string(),
                    value: "Retail".to_string(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_field_fallbacks() {
        let normalized = normalize_order(&full_order()).unwrap();
        assert_eq!(normalized.first_name, "Ana");
        // Blank customer last name falls through to billing.
        assert_eq!(normalized.last_name, "Rojas");
        assert_eq!(normalized.email, "order@example.cl");
        // Billing has no company, so the default address fills it.
        assert_eq!(normalized.company, "Andes SpA");
        assert_eq!(normalized.address, "Av. Siempre Viva 742");
        assert_eq!(normalized.city, "Santiago");
        assert_eq!(normalized.phone, "+56 9 1234 5678");
        assert_eq!(normalized.activity, "Retail");
        assert_eq!(normalized.customer_name(), "Ana Rojas");
    }

    #[test]
    fn test_tax_id_is_formatted() {
        let normalized = normalize_order(&full_order()).unwrap();
        assert_eq!(normalized.tax_id, "12.345.678-5");
        assert!(normalized.has_tax_id());
    }

    #[test]
    fn test_invalid_tax_id_becomes_empty() {
        let mut order = full_order();
        order.note_attributes[0].value = "12345678-0".to_string();
        let normalized = normalize_order(&order).unwrap();
        assert_eq!(normalized.tax_id, "");
    }

    #[test]
    fn test_empty_order_yields_empty_strings() {
        let order = CommerceOrder {
            id: 9,
            ..Default::default()
        };
        let normalized = normalize_order(&order).unwrap();
        assert_eq!(normalized.first_name, "");
        assert_eq!(normalized.email, "");
        assert_eq!(normalized.company, "");
        assert_eq!(normalized.phone, "");
        assert_eq!(normalized.gross_amount, Money::zero());
    }

    #[test]
    fn test_amounts() {
        let normalized = normalize_order(&full_order()).unwrap();
        assert_eq!(normalized.gross_amount.minor(), 1_190_000);
        assert_eq!(normalized.tax_amount.minor(), 190_000);
        assert_eq!(normalized.net_amount.minor(), 1_000_000);
    }

    #[test]
    fn test_net_comes_from_subtotal_when_shipping_is_charged() {
        let mut order = full_order();
        order.total_price = Some("129.00".to_string());
        order.subtotal_price = Some("100.00".to_string());
        order.total_tax = Some("19.00".to_string());

        let normalized = normalize_order(&order).unwrap();

        assert_eq!(normalized.net_amount.minor(), 10_000);
        assert_eq!(normalized.tax_amount.minor(), 1_900);
        assert_eq!(normalized.gross_amount.minor(), 12_900);
    }

    #[test]
    fn test_malformed_subtotal_rejected() {
        let mut order = full_order();
        order.subtotal_price = Some("100,00".to_string());
        assert!(normalize_order(&order).is_err());
    }

    #[test]
    fn test_malformed_amount_rejected() {
        let mut order = full_order();
        order.total_price = Some("11.900,00".to_string());
        assert!(normalize_order(&order).is_err());
    }

    #[test]
    fn test_missing_order_id_rejected() {
        let order = CommerceOrder::default();
        assert!(matches!(
            normalize_order(&order),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_line_prices() {
        let item = LineItem {
            quantity: 2,
            price: "5950.50".to_string(),
            total_discount: Some("100".to_string()),
            ..Default::default()
        };
        assert_eq!(line_unit_price(&item).unwrap().minor(), 595_050);
        assert_eq!(line_discount(&item).unwrap().minor(), 10_000);
    }
}
