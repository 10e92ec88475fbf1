//! # Fiscal Service Client
//!
//! reqwest implementation of [`FiscalApi`]. Every request carries the
//! shop's token in the `access_token` header.
//!
//! | Method | Path                          | Operation             |
//! |--------|-------------------------------|-----------------------|
//! | GET    | `/document_types.json`        | `list_document_types` |
//! | POST   | `/documents.json`             | `create_document`     |
//! | GET    | `/documents/{id}.json`        | `get_document`        |
//! | GET    | `/documents/{id}/pdf.json`    | `get_document_pdf`    |
//! | GET    | `/stocks.json`                | `get_stock`           |
//! | POST   | `/stocks.json`                | `set_stock`           |
//! | GET    | `/branches.json`              | `list_branches`       |
//! | GET    | `/warehouses.json`            | `list_warehouses`     |

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use fiscal_core::catalog::CatalogDocumentType;

use super::{
    credential_header, ensure_success, join, parse_tax_code, read_json, send_with_retry,
    DocumentRequest, FiscalApi, Idempotency, IssuedDocument, NamedResource, RemoteDocument,
    RetryPolicy,
};
use crate::error::{ClientError, ClientResult};

const TOKEN_HEADER: &str = "access_token";

/// Paged collection envelope used by every list endpoint.
#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentTypeItem {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default, alias = "siiCode")]
    code_sii: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockItem {
    #[serde(default)]
    quantity_available: Option<f64>,
    #[serde(default)]
    quantity: Option<f64>,
}

#[derive(Debug, Serialize)]
struct StockWrite {
    variant_id: i64,
    warehouse_id: i64,
    quantity: i64,
}

/// Client for one shop's fiscal service account.
#[derive(Debug, Clone)]
pub struct FiscalClient {
    http: reqwest::Client,
    base_url: Url,
    token: HeaderValue,
    retry: RetryPolicy,
}

impl FiscalClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        token: &str,
        retry: RetryPolicy,
    ) -> ClientResult<Self> {
        Ok(FiscalClient {
            http,
            base_url,
            token: credential_header(token)?,
            retry,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        let endpoint = format!("GET {path}");
        let url = join(&self.base_url, path)?;
        let resp = send_with_retry(&self.retry, &endpoint, Idempotency::Idempotent, || {
            self.http
                .get(url.clone())
                .header(TOKEN_HEADER, self.token.clone())
                .query(query)
                .send()
        })
        .await?;
        read_json(&endpoint, resp).await
    }

    async fn post_json<B: Serialize + Sync, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let endpoint = format!("POST {path}");
        let url = join(&self.base_url, path)?;
        let resp = send_with_retry(&self.retry, &endpoint, Idempotency::NonIdempotent, || {
            self.http
                .post(url.clone())
                .header(TOKEN_HEADER, self.token.clone())
                .json(body)
                .send()
        })
        .await?;
        read_json(&endpoint, resp).await
    }
}

#[async_trait]
impl FiscalApi for FiscalClient {
    async fn list_document_types(&self) -> ClientResult<Vec<CatalogDocumentType>> {
        let page: Collection<DocumentTypeItem> = self.get_json("document_types.json", &[]).await?;
        Ok(page
            .items
            .into_iter()
            .map(|item| CatalogDocumentType {
                id: item.id,
                name: item.name,
                tax_code: parse_tax_code(item.code_sii),
            })
            .collect())
    }

    async fn create_document(&self, request: &DocumentRequest) -> ClientResult<IssuedDocument> {
        let issued: IssuedDocument = self.post_json("documents.json", request).await?;
        debug!(
            document_id = issued.id,
            number = ?issued.number,
            document_type_id = request.document_type_id,
            "Fiscal document created"
        );
        Ok(issued)
    }

    async fn get_document(&self, id: i64) -> ClientResult<RemoteDocument> {
        self.get_json(&format!("documents/{id}.json"), &[]).await
    }

    async fn get_document_pdf(&self, id: i64) -> ClientResult<Vec<u8>> {
        let path = format!("documents/{id}/pdf.json");
        let endpoint = format!("GET {path}");
        let url = join(&self.base_url, &path)?;
        let resp = send_with_retry(&self.retry, &endpoint, Idempotency::Idempotent, || {
            self.http
                .get(url.clone())
                .header(TOKEN_HEADER, self.token.clone())
                .header(reqwest::header::ACCEPT, "application/pdf")
                .send()
        })
        .await?;
        let resp = ensure_success(&endpoint, resp).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ClientError::from_reqwest(&endpoint, e))?;
        Ok(bytes.to_vec())
    }

    async fn get_stock(&self, variant_id: i64, warehouse_id: Option<i64>) -> ClientResult<Option<i64>> {
        let mut query = vec![("variant_id", variant_id.to_string())];
        if let Some(warehouse) = warehouse_id {
            query.push(("warehouse_id", warehouse.to_string()));
        }
        let page: Collection<StockItem> = self.get_json("stocks.json", &query).await?;
        Ok(page.items.into_iter().next().and_then(|item| {
            item.quantity_available
                .or(item.quantity)
                .map(|q| q.round() as i64)
        }))
    }

    async fn set_stock(&self, variant_id: i64, warehouse_id: i64, quantity: i64) -> ClientResult<()> {
        let _: serde_json::Value = self
            .post_json(
                "stocks.json",
                &StockWrite {
                    variant_id,
                    warehouse_id,
                    quantity,
                },
            )
            .await?;
        Ok(())
    }

    async fn list_branches(&self) -> ClientResult<Vec<NamedResource>> {
        let page: Collection<NamedResource> = self.get_json("branches.json", &[]).await?;
        Ok(page.items)
    }

    async fn list_warehouses(&self, branch_id: Option<i64>) -> ClientResult<Vec<NamedResource>> {
        let query: Vec<(&str, String)> = branch_id
            .map(|id| vec![("branch_id", id.to_string())])
            .unwrap_or_default();
        let page: Collection<NamedResource> = self.get_json("warehouses.json", &query).await?;
        Ok(page.items)
    }
}
