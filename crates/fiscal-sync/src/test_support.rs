//! Fixtures shared by the unit tests of this crate.

use chrono::Utc;
use uuid::Uuid;

use fiscal_core::{CatalogMapping, CommerceOrder, DocumentType, LineItem, Shop, ShopSettings};
use fiscal_db::{Database, DbConfig};

pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// Configured shop issuing receipts (type id 1) and credit notes (9).
pub fn sample_shop(domain: &str) -> Shop {
    let mut settings = ShopSettings::default();
    settings.document_type_ids.insert(DocumentType::Receipt, 1);
    settings.document_type_ids.insert(DocumentType::CreditNote, 9);
    Shop {
        id: Uuid::new_v4().to_string(),
        domain: domain.to_string(),
        commerce_access_token: "shpat_test".to_string(),
        commerce_location_id: Some(1),
        fiscal_api_token: "fiscal-token".to_string(),
        fiscal_branch_id: Some(1),
        fiscal_warehouse_id: Some(1),
        is_configured: true,
        settings,
        installed_at: Utc::now(),
        uninstalled_at: None,
        updated_at: Utc::now(),
    }
}

pub async fn seeded_shop(db: &Database) -> Shop {
    let shop = sample_shop("test-store.myshopify.com");
    db.shops().upsert(&shop).await.unwrap();
    shop
}

/// Active, stock-synced mapping; inventory item id is `product * 100`.
pub fn mapping(shop_id: &str, product: i64, variant: Option<i64>, fiscal_variant: i64) -> CatalogMapping {
    CatalogMapping {
        id: Uuid::new_v4().to_string(),
        shop_id: shop_id.to_string(),
        commerce_product_id: product,
        commerce_variant_id: variant,
        commerce_inventory_item_id: Some(product * 100),
        commerce_sku: Some(format!("SKU-{product}")),
        fiscal_item_id: fiscal_variant,
        fiscal_variant_id: Some(fiscal_variant),
        sync_stock: true,
        sync_price: false,
        is_active: true,
        last_synced_quantity: None,
        last_synced_at: None,
        last_error: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn line(product: i64, variant: Option<i64>, quantity: i64, price: &str) -> LineItem {
    LineItem {
        id: product * 1000,
        product_id: Some(product),
        variant_id: variant,
        sku: Some(format!("SKU-{product}")),
        title: format!("Product {product}"),
        name: None,
        quantity,
        price: price.to_string(),
        total_discount: None,
    }
}

pub fn order(id: i64, line_items: Vec<LineItem>) -> CommerceOrder {
    CommerceOrder {
        id,
        name: format!("#{id}"),
        order_number: Some(id),
        email: Some("buyer@example.cl".to_string()),
        currency: Some("CLP".to_string()),
        total_price: Some("19.90".to_string()),
        total_tax: Some("3.18".to_string()),
        line_items,
        ..Default::default()
    }
}
