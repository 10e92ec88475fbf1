//! # External API Clients
//!
//! Trait seams for the two remote systems plus their reqwest
//! implementations.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Client Layout                                    │
//! │                                                                         │
//! │  ClientFactory::fiscal(&shop) ──► Arc<dyn FiscalApi>    (access_token) │
//! │  ClientFactory::commerce(&shop) ► Arc<dyn CommerceApi>  (X-Shopify-..) │
//! │                                                                         │
//! │  HttpClientFactory   one shared reqwest::Client (timeout), per-shop    │
//! │                      credentials and base URLs                         │
//! │  FakeClientFactory   in-memory doubles (tests, `test-util` feature)    │
//! │                                                                         │
//! │  Transport errors and timeouts: retried with exponential backoff       │
//! │  Non-2xx responses:             ClientError::ApiError { status, body } │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

use fiscal_core::catalog::CatalogDocumentType;
use fiscal_core::{CommerceOrder, Shop};

use crate::config::BridgeConfig;
use crate::error::{ClientError, ClientResult, SyncError, SyncResult};

pub mod commerce;
pub mod fiscal;

#[cfg(any(test, feature = "test-util"))]
pub mod fakes;

pub use commerce::CommerceClient;
pub use fiscal::FiscalClient;

// =============================================================================
// Fiscal Service Payloads
// =============================================================================

/// Body of `POST /documents.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    pub document_type_id: i64,
    pub branch_id: i64,
    /// Unix seconds.
    pub emission_date: i64,
    pub client: DocumentClient,
    pub details: Vec<DocumentDetail>,
    pub note: String,
    /// Number of the referenced document (credit notes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<i64>,
    /// Tax code of the referenced document (credit notes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sii_code: Option<i64>,
}

/// Customer block of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentClient {
    /// Tax ID in dotted form, empty when the order carries none.
    pub code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: String,
    pub activity: String,
    pub address: String,
    pub city: String,
    pub phone: String,
}

/// One document line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    pub variant_id: i64,
    pub quantity: i64,
    /// Major currency units.
    pub unit_price: f64,
    /// Percentage of the line total.
    pub discount: f64,
    pub comment: String,
}

/// What the fiscal service hands back for a created document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssuedDocument {
    pub id: i64,
    #[serde(default)]
    pub number: Option<i64>,
    /// Tax authority code of the issued document, when the service echoes it.
    #[serde(
        default,
        rename = "codeSii",
        alias = "siiCode",
        deserialize_with = "lenient_tax_code"
    )]
    pub tax_code: Option<i64>,
}

/// The service reports tax codes either as numbers or numeric strings.
pub(crate) fn parse_tax_code(value: Option<serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_tax_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(parse_tax_code(Option::deserialize(deserializer)?))
}

/// A document as read back from the fiscal service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub id: i64,
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub state: Option<i64>,
}

/// Id and display name of a branch, warehouse or location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Commerce product variant, as far as stock sync needs it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommerceVariant {
    pub id: i64,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub inventory_item_id: Option<i64>,
}

// =============================================================================
// Traits
// =============================================================================

/// Fiscal document service (electronic invoicing + fiscal catalog stock).
#[async_trait]
pub trait FiscalApi: Send + Sync {
    async fn list_document_types(&self) -> ClientResult<Vec<CatalogDocumentType>>;

    async fn create_document(&self, request: &DocumentRequest) -> ClientResult<IssuedDocument>;

    async fn get_document(&self, id: i64) -> ClientResult<RemoteDocument>;

    /// Raw PDF bytes of an issued document.
    async fn get_document_pdf(&self, id: i64) -> ClientResult<Vec<u8>>;

    /// Available quantity of a variant, `None` when the service has no
    /// stock row for it.
    async fn get_stock(&self, variant_id: i64, warehouse_id: Option<i64>) -> ClientResult<Option<i64>>;

    async fn set_stock(&self, variant_id: i64, warehouse_id: i64, quantity: i64) -> ClientResult<()>;

    async fn list_branches(&self) -> ClientResult<Vec<NamedResource>>;

    async fn list_warehouses(&self, branch_id: Option<i64>) -> ClientResult<Vec<NamedResource>>;
}

/// Commerce platform Admin API.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    async fn get_order(&self, order_id: i64) -> ClientResult<CommerceOrder>;

    async fn get_variant(&self, variant_id: i64) -> ClientResult<CommerceVariant>;

    /// Available quantity at a location, `None` when the item is not
    /// stocked there.
    async fn get_inventory_level(
        &self,
        inventory_item_id: i64,
        location_id: i64,
    ) -> ClientResult<Option<i64>>;

    async fn set_inventory_level(
        &self,
        inventory_item_id: i64,
        location_id: i64,
        available: i64,
    ) -> ClientResult<()>;

    async fn list_locations(&self) -> ClientResult<Vec<NamedResource>>;
}

/// Builds clients bound to one shop's credentials.
pub trait ClientFactory: Send + Sync {
    fn fiscal(&self, shop: &Shop) -> SyncResult<Arc<dyn FiscalApi>>;

    fn commerce(&self, shop: &Shop) -> SyncResult<Arc<dyn CommerceApi>>;
}

// =============================================================================
// HTTP Client Factory
// =============================================================================

/// Transport retry policy for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    /// Total time spent retrying before the error is returned.
    pub budget: Duration,
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_interval: self.budget,
            multiplier: 2.0,
            max_elapsed_time: Some(self.budget),
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_interval: Duration::from_millis(200),
            budget: Duration::from_secs(5),
        }
    }
}

/// Production factory: one shared connection pool, per-shop credentials.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    http: reqwest::Client,
    fiscal_base: Url,
    commerce_base: Option<Url>,
    api_version: String,
    retry: RetryPolicy,
}

impl HttpClientFactory {
    /// Builds the factory from the bridge configuration.
    pub fn new(config: &BridgeConfig) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.http.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let fiscal_base = parse_base(&config.fiscal.base_url)?;
        let commerce_base = config
            .commerce
            .base_url
            .as_deref()
            .map(parse_base)
            .transpose()?;

        Ok(HttpClientFactory {
            http,
            fiscal_base,
            commerce_base,
            api_version: config.commerce.api_version.clone(),
            retry: RetryPolicy {
                initial_interval: Duration::from_millis(config.http.retry_initial_ms),
                budget: Duration::from_secs(config.http.retry_budget_secs),
            },
        })
    }
}

impl ClientFactory for HttpClientFactory {
    fn fiscal(&self, shop: &Shop) -> SyncResult<Arc<dyn FiscalApi>> {
        if shop.fiscal_api_token.trim().is_empty() {
            return Err(SyncError::Config(format!(
                "shop {} has no fiscal API token",
                shop.domain
            )));
        }
        Ok(Arc::new(FiscalClient::new(
            self.http.clone(),
            self.fiscal_base.clone(),
            &shop.fiscal_api_token,
            self.retry,
        )?))
    }

    fn commerce(&self, shop: &Shop) -> SyncResult<Arc<dyn CommerceApi>> {
        if shop.commerce_access_token.trim().is_empty() {
            return Err(SyncError::Config(format!(
                "shop {} has no commerce access token",
                shop.domain
            )));
        }
        let origin = match &self.commerce_base {
            Some(url) => url.clone(),
            None => parse_base(&format!("https://{}", shop.domain))?,
        };
        let base = join(&origin, &format!("admin/api/{}/", self.api_version))?;
        Ok(Arc::new(CommerceClient::new(
            self.http.clone(),
            base,
            &shop.commerce_access_token,
            self.retry,
        )?))
    }
}

// =============================================================================
// Shared Request Helpers
// =============================================================================

fn parse_base(raw: &str) -> ClientResult<Url> {
    Url::parse(raw).map_err(|e| ClientError::Config(format!("invalid base URL '{raw}': {e}")))
}

/// Joins `path` under `base`, treating `base` as a directory.
pub(crate) fn join(base: &Url, path: &str) -> ClientResult<Url> {
    let mut dir = base.clone();
    if !dir.path().ends_with('/') {
        let with_slash = format!("{}/", dir.path());
        dir.set_path(&with_slash);
    }
    dir.join(path.trim_start_matches('/'))
        .map_err(|e| ClientError::Config(format!("invalid path '{path}': {e}")))
}

pub(crate) fn credential_header(value: &str) -> ClientResult<HeaderValue> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|_| ClientError::Config("credential is not a valid header value".into()))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Whether a request may be sent again after its outcome is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Idempotency {
    /// Reads. Timeouts are retried.
    Idempotent,
    /// Writes. Only failures to connect are retried; a timed out write may
    /// already have been applied.
    NonIdempotent,
}

/// Sends a request, retrying transport failures with exponential backoff.
///
/// `send` is called once per attempt. Any HTTP response, whatever its
/// status, ends the loop; the caller inspects the status.
pub(crate) async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    endpoint: &str,
    idempotency: Idempotency,
    send: F,
) -> ClientResult<reqwest::Response>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let send = &send;
    let retry_timeouts = idempotency == Idempotency::Idempotent;
    backoff::future::retry(policy.backoff(), || async move {
        send().await.map_err(|err| {
            if err.is_connect() || (retry_timeouts && err.is_timeout()) {
                warn!(endpoint = %endpoint, error = %err, "Request failed, retrying");
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            }
        })
    })
    .await
    .map_err(|err| ClientError::from_reqwest(endpoint, err))
}

/// Fails with [`ClientError::ApiError`] on a non-2xx response.
pub(crate) async fn ensure_success(
    endpoint: &str,
    resp: reqwest::Response,
) -> ClientResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|e| format!("(failed to read response body: {e})"));
    Err(ClientError::ApiError {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Checks the status and decodes a JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
) -> ClientResult<T> {
    let resp = ensure_success(endpoint, resp).await?;
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ClientError::from_reqwest(endpoint, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Deserialization {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}
