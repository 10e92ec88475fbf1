//! # Sync Error Types
//!
//! Error types for the issuance pipeline, the reconciliation engine and the
//! external API clients.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Pipeline Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Validation     │  │ Data complete-  │  │  External API           │ │
//! │  │                 │  │ ness            │  │                         │ │
//! │  │  Core           │  │  Incomplete     │  │  Client(Http)           │ │
//! │  │  Validation     │  │  (no mapped     │  │  Client(Timeout)        │ │
//! │  │  Payload        │  │   items)        │  │  Client(ApiError)       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │        terminal             terminal         retryable if transient    │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │ Configuration   │  │    Storage      │  │      Stock              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Config         │  │  Storage(Db)    │  │  Conflict               │ │
//! │  │  ConfigLoad     │  │                 │  │  DirectionNotAllowed    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use fiscal_core::{CoreError, SyncDirection, ValidationError};
use fiscal_db::DbError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for external API calls.
pub type ClientResult<T> = Result<T, ClientError>;

// =============================================================================
// Client Error
// =============================================================================

/// Failure talking to the fiscal service or the commerce platform.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (connection refused, DNS, TLS, reset).
    ///
    /// ## When This Occurs
    /// - The service is unreachable after the client's own retries
    #[error("HTTP request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded the configured timeout.
    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// The service answered with a non-2xx status.
    #[error("{endpoint} returned {status}: {body}")]
    ApiError {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// A 2xx response whose body did not match the expected shape.
    #[error("Unexpected response from {endpoint}: {reason}")]
    Deserialization { endpoint: String, reason: String },

    /// The client could not be built (bad base URL, bad credential header).
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether trying again later could succeed.
    ///
    /// Transport failures, timeouts, throttling and 5xx responses are
    /// transient. Other 4xx responses and shape mismatches are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http { .. } | ClientError::Timeout { .. } => true,
            ClientError::ApiError { status, .. } => *status == 429 || *status >= 500,
            ClientError::Deserialization { .. } | ClientError::Config(_) => false,
        }
    }

    /// Classifies a reqwest error raised while sending or reading.
    pub(crate) fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else if err.is_decode() {
            ClientError::Deserialization {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        } else {
            ClientError::Http {
                endpoint: endpoint.to_string(),
                source: err,
            }
        }
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Pipeline error type covering every failure an event or a stock sync can
/// end with.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Validation Errors (terminal)
    // =========================================================================
    /// Business rule violation (e.g. invoice without a valid tax ID).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Malformed input field.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The stored or delivered payload is not the expected JSON shape.
    #[error("Invalid payload: {0}")]
    Payload(String),

    // =========================================================================
    // Data Completeness (terminal)
    // =========================================================================
    /// Order lines could not be mapped to fiscal items.
    ///
    /// ## When This Occurs
    /// - No line has a mapping (`no mapped items`)
    /// - `require_all_items_mapped` and some line is unmapped
    #[error("{0}")]
    Incomplete(String),

    // =========================================================================
    // Configuration (terminal)
    // =========================================================================
    /// Shop is missing something the operation needs.
    ///
    /// ## When This Occurs
    /// - No external type id configured for the resolved document class
    /// - No fiscal branch or warehouse configured
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to load the bridge configuration file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // =========================================================================
    // External / Storage (retryable when transient)
    // =========================================================================
    /// External API failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Database failure.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    // =========================================================================
    // Stock Sync
    // =========================================================================
    /// Both catalogs moved away from the last synced quantity.
    #[error("conflict: both catalogs changed since last sync")]
    Conflict,

    /// Requested direction is not permitted by the shop's policy.
    #[error("Direction {requested} not allowed by shop policy {policy}")]
    DirectionNotAllowed {
        requested: SyncDirection,
        policy: SyncDirection,
    },

    /// Stock sync requested for a mapping with `sync_stock = false` or a
    /// shop with stock sync disabled.
    #[error("Stock sync disabled: {0}")]
    StockSyncDisabled(String),

    // =========================================================================
    // Internal
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Payload(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        SyncError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true if the replay worker should try this event again.
    ///
    /// ## Retryable Errors
    /// - Transient external API failures
    /// - Transient storage failures
    ///
    /// ## Non-Retryable Errors
    /// - Validation, data completeness and configuration errors
    /// - Stock conflicts
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Client(err) => err.is_transient(),
            SyncError::Storage(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this error comes from the external services.
    pub fn is_external(&self) -> bool {
        matches!(self, SyncError::Client(_))
    }
}
