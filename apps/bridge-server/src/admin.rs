//! # Admin API
//!
//! Bearer-token protected operations:
//! - `POST /api/stock-sync` runs a manual reconciliation for one mapping
//! - `POST /api/tax-id/validate` checks and formats a tax ID
//!
//! When no admin token is configured every request is rejected.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::Response,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use fiscal_core::{tax_id, StockSyncLogEntry, SyncDirection, SyncSource};
use fiscal_sync::SyncError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Admin routes, wrapped in the bearer check.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/stock-sync", post(stock_sync))
        .route("/api/tax-id/validate", post(validate_tax_id))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

/// Constant-time token comparison. Only the token length can leak.
fn token_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let Some(expected) = state.admin_token.as_deref() else {
        warn!("Admin request rejected: no admin token configured");
        return Err(ApiError::Unauthorized("admin API is disabled".into()));
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    if !token_matches(provided.trim(), expected) {
        warn!("Admin request rejected: invalid bearer token");
        return Err(ApiError::Unauthorized("invalid bearer token".into()));
    }

    Ok(next.run(request).await)
}

// =============================================================================
// Stock Sync
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StockSyncRequest {
    pub shop_domain: String,
    pub mapping_id: String,
    pub direction: SyncDirection,
}

async fn stock_sync(
    State(state): State<AppState>,
    Json(request): Json<StockSyncRequest>,
) -> ApiResult<Json<StockSyncLogEntry>> {
    let shop = state
        .db
        .shops()
        .find_by_domain(&request.shop_domain)
        .await
        .map_err(SyncError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("shop {}", request.shop_domain)))?;
    if !shop.is_active() {
        return Err(ApiError::BadRequest(format!(
            "shop {} is not active",
            shop.domain
        )));
    }

    info!(
        shop_id = %shop.id,
        mapping_id = %request.mapping_id,
        direction = %request.direction,
        "Manual stock sync requested"
    );

    let entry = state
        .processor
        .reconciler()
        .sync_mapping(
            &shop,
            &request.mapping_id,
            request.direction,
            SyncSource::Manual,
            None,
        )
        .await?;

    Ok(Json(entry))
}

// =============================================================================
// Tax ID Validation
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TaxIdRequest {
    pub tax_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxIdResponse {
    pub valid: bool,
    pub formatted: Option<String>,
}

async fn validate_tax_id(Json(request): Json<TaxIdRequest>) -> Json<TaxIdResponse> {
    let formatted = tax_id::format(&request.tax_id);
    Json(TaxIdResponse {
        valid: formatted.is_some(),
        formatted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_matches() {
        assert!(token_matches("secret-token", "secret-token"));
        assert!(!token_matches("secret-tokeN", "secret-token"));
        assert!(!token_matches("secret", "secret-token"));
        assert!(!token_matches("", "secret-token"));
        assert!(!token_matches("secret-token-and-more", "secret-token"));
    }
}
