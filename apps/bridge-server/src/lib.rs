//! # Fiscal Bridge Server
//!
//! HTTP surface of the bridge.
//!
//! ## Routes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST /webhooks/orders/create            HMAC verified, always 200      │
//! │  POST /webhooks/orders/cancelled         HMAC verified, always 200      │
//! │  POST /webhooks/inventory_levels/update  HMAC verified, always 200      │
//! │  POST /webhooks/app/uninstalled          HMAC verified, always 200      │
//! │                                                                         │
//! │  POST /api/stock-sync                    bearer token                   │
//! │  POST /api/tax-id/validate               bearer token                   │
//! │                                                                         │
//! │  GET  /health                            open                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod admin;
pub mod error;
pub mod state;
pub mod webhooks;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

pub use state::AppState;

/// Builds the full router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(webhooks::routes())
        .merge(admin::routes(state.clone()))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = state.db.health_check().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if database { "ok" } else { "degraded" },
            "database": database,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    use fiscal_core::{
        CatalogMapping, DocumentType, EventTopic, Shop, ShopSettings, SyncDirection,
    };
    use fiscal_db::{Database, DbConfig};
    use fiscal_sync::clients::fakes::FakeClientFactory;
    use fiscal_sync::config::ReplaySettings;
    use fiscal_sync::EventProcessor;

    const SECRET: &str = "webhook-secret";
    const ADMIN: &str = "admin-token";
    const DOMAIN: &str = "test-store.myshopify.com";

    struct Harness {
        db: Database,
        shop: Shop,
        fakes: FakeClientFactory,
        app: Router,
    }

    async fn harness(admin_token: Option<&str>) -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut settings = ShopSettings {
            sync_stock_enabled: true,
            ..Default::default()
        };
        settings.document_type_ids.insert(DocumentType::Receipt, 1);
        settings.document_type_ids.insert(DocumentType::CreditNote, 9);
        let shop = Shop {
            id: uuid::Uuid::new_v4().to_string(),
            domain: DOMAIN.to_string(),
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
        };
        db.shops().upsert(&shop).await.unwrap();

        let fakes = FakeClientFactory::new();
        let processor =
            EventProcessor::new(db.clone(), Arc::new(fakes.clone()), ReplaySettings::default());
        let app = build_router(AppState::new(db.clone(), processor, SECRET, admin_token));

        Harness {
            db,
            shop,
            fakes,
            app,
        }
    }

    fn mapping(shop_id: &str) -> CatalogMapping {
        CatalogMapping {
            id: "map-7".to_string(),
            shop_id: shop_id.to_string(),
            commerce_product_id: 7,
            commerce_variant_id: Some(77),
            commerce_inventory_item_id: Some(700),
            commerce_sku: Some("SKU-7".to_string()),
            fiscal_item_id: 70,
            fiscal_variant_id: Some(70),
            sync_stock: true,
            sync_price: false,
            is_active: true,
            last_synced_quantity: Some(10),
            last_synced_at: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    const ORDER: &str = r##"{
        "id": 9001,
        "name": "#9001",
        "email": "buyer@example.cl",
        "currency": "CLP",
        "total_price": "11900",
        "total_tax": "1900",
        "line_items": [
            {"id": 1, "product_id": 7, "variant_id": 77, "title": "Mug", "quantity": 1, "price": "11900"}
        ]
    }"##;

    fn signed(uri: &str, body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(webhooks::SHOP_DOMAIN_HEADER, DOMAIN);
        if let Some(signature) = signature {
            builder = builder.header(webhooks::HMAC_HEADER, signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn admin(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(None).await;

        let response = h
            .app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["database"], true);
    }

    #[tokio::test]
    async fn test_unsigned_webhook_rejected_before_processing() {
        let h = harness(None).await;

        let response = h
            .app
            .oneshot(signed("/webhooks/orders/create", ORDER, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(h
            .db
            .events()
            .find(&h.shop.id, EventTopic::OrderCreated, "9001")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_wrong_signature_rejected() {
        let h = harness(None).await;
        let forged = webhooks::sign("not-the-secret", ORDER.as_bytes());

        let response = h
            .app
            .oneshot(signed("/webhooks/orders/create", ORDER, Some(forged)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(h.fakes.fiscal.created().await.is_empty());
    }

    #[tokio::test]
    async fn test_signed_order_issues_document() {
        let h = harness(None).await;
        h.db.mappings().insert(&mapping(&h.shop.id)).await.unwrap();
        let signature = webhooks::sign(SECRET, ORDER.as_bytes());

        let response = h
            .app
            .oneshot(signed("/webhooks/orders/create", ORDER, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
        assert_eq!(h.fakes.fiscal.created().await.len(), 1);
    }

    #[tokio::test]
    async fn test_processing_failure_still_acknowledged() {
        let h = harness(None).await;
        let signature = webhooks::sign(SECRET, ORDER.as_bytes());

        let response = h
            .app
            .oneshot(signed("/webhooks/orders/create", ORDER, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let record = h
            .db
            .events()
            .find(&h.shop.id, EventTopic::OrderCreated, "9001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.error_message.as_deref(), Some("no mapped items"));
    }

    #[tokio::test]
    async fn test_admin_disabled_without_token() {
        let h = harness(None).await;

        let response = h
            .app
            .oneshot(admin(
                "/api/tax-id/validate",
                Some("anything"),
                json!({ "tax_id": "12345670-K" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_rejects_wrong_token() {
        let h = harness(Some(ADMIN)).await;

        let response = h
            .app
            .oneshot(admin(
                "/api/tax-id/validate",
                Some("wrong"),
                json!({ "tax_id": "12345670-K" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_tax_id_validation() {
        let h = harness(Some(ADMIN)).await;

        let response = h
            .app
            .clone()
            .oneshot(admin(
                "/api/tax-id/validate",
                Some(ADMIN),
                json!({ "tax_id": "12345670-k" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "valid": true, "formatted": "12.345.670-K" })
        );

        let response = h
            .app
            .oneshot(admin(
                "/api/tax-id/validate",
                Some(ADMIN),
                json!({ "tax_id": "12.345.678-6" }),
            ))
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!({ "valid": false, "formatted": null })
        );
    }

    #[tokio::test]
    async fn test_manual_stock_sync_returns_log_entry() {
        let h = harness(Some(ADMIN)).await;
        h.db.mappings().insert(&mapping(&h.shop.id)).await.unwrap();
        h.fakes.commerce.set_level(700, 1, 7).await;

        let response = h
            .app
            .oneshot(admin(
                "/api/stock-sync",
                Some(ADMIN),
                json!({
                    "shop_domain": DOMAIN,
                    "mapping_id": "map-7",
                    "direction": SyncDirection::ToExternal,
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let entry = body_json(response).await;
        assert_eq!(entry["status"], "success");
        assert_eq!(entry["source"], "manual");
        assert_eq!(entry["delta"], -3);
        assert_eq!(h.fakes.fiscal.stock_writes().await, vec![(70, 1, 7)]);
    }

    #[tokio::test]
    async fn test_manual_stock_sync_unknown_shop() {
        let h = harness(Some(ADMIN)).await;

        let response = h
            .app
            .oneshot(admin(
                "/api/stock-sync",
                Some(ADMIN),
                json!({
                    "shop_domain": "missing.myshopify.com",
                    "mapping_id": "map-7",
                    "direction": "to_external",
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
