//! Error types for the bridge HTTP API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use fiscal_sync::SyncError;

/// Admin API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Sync(err) => match err {
                SyncError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                SyncError::DirectionNotAllowed { .. } | SyncError::StockSyncDisabled(_) => {
                    (StatusCode::CONFLICT, "STOCK_SYNC_REJECTED")
                }
                SyncError::Core(_)
                | SyncError::Validation(_)
                | SyncError::Payload(_)
                | SyncError::Incomplete(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
                }
                SyncError::Client(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        if status.is_server_error() {
            error!(error = %self, "Admin request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Unauthorized("x".into()).parts().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(SyncError::not_found("CatalogMapping", "m1")).parts().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(SyncError::StockSyncDisabled("off".into())).parts().0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(SyncError::Config("bad".into())).parts().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
