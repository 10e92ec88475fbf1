//! # Webhook Receiver
//!
//! ```text
//! POST /webhooks/{topic}
//!   │
//!   ├── X-Shopify-Hmac-Sha256 missing or wrong ──► 401 (nothing processed)
//!   │
//!   └── signature ok ──► EventProcessor::handle_webhook ──► 200 "OK"
//!                         (failures are logged and recorded, never surfaced)
//! ```
//!
//! The signature is the base64 HMAC-SHA256 of the raw body keyed with the
//! app secret, so the body is taken as bytes and only parsed after
//! verification.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error, warn};

use fiscal_core::EventTopic;

use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";
pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";

/// Webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks/orders/create", post(orders_create))
        .route("/webhooks/orders/cancelled", post(orders_cancelled))
        .route("/webhooks/inventory_levels/update", post(inventory_levels_update))
        .route("/webhooks/app/uninstalled", post(app_uninstalled))
}

/// Base64 HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Constant-time check of a webhook signature header.
pub fn verify_signature(secret: &str, body: &[u8], provided: &str) -> bool {
    let expected = sign(secret, body);
    let provided = provided.trim().as_bytes();
    let expected = expected.as_bytes();
    if expected.is_empty() || provided.len() != expected.len() {
        return false;
    }
    provided.ct_eq(expected).into()
}

async fn orders_create(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    receive(&state, EventTopic::OrderCreated, &headers, &body).await
}

async fn orders_cancelled(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    receive(&state, EventTopic::OrderCancelled, &headers, &body).await
}

async fn inventory_levels_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    receive(&state, EventTopic::InventoryLevelUpdated, &headers, &body).await
}

async fn app_uninstalled(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    receive(&state, EventTopic::AppUninstalled, &headers, &body).await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn receive(state: &AppState, topic: EventTopic, headers: &HeaderMap, body: &[u8]) -> Response {
    let Some(signature) = header(headers, HMAC_HEADER) else {
        warn!(topic = %topic, "Webhook without signature");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    };
    if !verify_signature(&state.webhook_secret, body, signature) {
        warn!(topic = %topic, "Webhook signature mismatch");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let acknowledged = (StatusCode::OK, "OK").into_response();

    let Some(shop_domain) = header(headers, SHOP_DOMAIN_HEADER) else {
        warn!(topic = %topic, "Webhook without shop domain");
        return acknowledged;
    };
    let Ok(payload) = std::str::from_utf8(body) else {
        warn!(topic = %topic, shop_domain = %shop_domain, "Webhook body is not UTF-8");
        return acknowledged;
    };

    match state
        .processor
        .handle_webhook(shop_domain, topic, payload)
        .await
    {
        Ok(outcome) => debug!(topic = %topic, shop_domain = %shop_domain, ?outcome, "Webhook handled"),
        Err(e) => error!(topic = %topic, shop_domain = %shop_domain, error = %e, "Webhook handling failed"),
    }

    acknowledged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let body = br#"{"id":1}"#;
        let signature = sign("shh", body);

        assert!(verify_signature("shh", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("shh", br#"{"id":2}"#, &signature));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2, base64 encoded.
        assert_eq!(
            sign("Jefe", b"what do ya want for nothing?"),
            "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM="
        );
    }

    #[test]
    fn test_garbage_signature_rejected() {
        assert!(!verify_signature("shh", b"{}", ""));
        assert!(!verify_signature("shh", b"{}", "not-base64"));
    }
}
