//! # Commerce Platform Client
//!
//! reqwest implementation of [`CommerceApi`] against the Admin REST API,
//! rooted at `{origin}/admin/api/{version}/`.

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use fiscal_core::CommerceOrder;

use super::{
    credential_header, join, read_json, send_with_retry, CommerceApi, CommerceVariant,
    Idempotency, NamedResource, RetryPolicy,
};
use crate::error::ClientResult;

const TOKEN_HEADER: &str = "X-Shopify-Access-Token";

#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    order: CommerceOrder,
}

#[derive(Debug, Deserialize)]
struct VariantEnvelope {
    variant: CommerceVariant,
}

#[derive(Debug, Deserialize)]
struct InventoryLevel {
    #[serde(default)]
    available: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct InventoryLevels {
    #[serde(default)]
    inventory_levels: Vec<InventoryLevel>,
}

#[derive(Debug, Serialize)]
struct InventorySet {
    location_id: i64,
    inventory_item_id: i64,
    available: i64,
}

#[derive(Debug, Deserialize)]
struct Locations {
    #[serde(default)]
    locations: Vec<NamedResource>,
}

/// Client for one shop's Admin API.
#[derive(Debug, Clone)]
pub struct CommerceClient {
    http: reqwest::Client,
    base_url: Url,
    token: HeaderValue,
    retry: RetryPolicy,
}

impl CommerceClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        access_token: &str,
        retry: RetryPolicy,
    ) -> ClientResult<Self> {
        Ok(CommerceClient {
            http,
            base_url,
            token: credential_header(access_token)?,
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
}

#[async_trait]
impl CommerceApi for CommerceClient {
    async fn get_order(&self, order_id: i64) -> ClientResult<CommerceOrder> {
        let envelope: OrderEnvelope = self.get_json(&format!("orders/{order_id}.json"), &[]).await?;
        Ok(envelope.order)
    }

    async fn get_variant(&self, variant_id: i64) -> ClientResult<CommerceVariant> {
        let envelope: VariantEnvelope = self
            .get_json(&format!("variants/{variant_id}.json"), &[])
            .await?;
        Ok(envelope.variant)
    }

    async fn get_inventory_level(
        &self,
        inventory_item_id: i64,
        location_id: i64,
    ) -> ClientResult<Option<i64>> {
        let levels: InventoryLevels = self
            .get_json(
                "inventory_levels.json",
                &[
                    ("inventory_item_ids", inventory_item_id.to_string()),
                    ("location_ids", location_id.to_string()),
                ],
            )
            .await?;
        Ok(levels
            .inventory_levels
            .into_iter()
            .next()
            .and_then(|level| level.available))
    }

    async fn set_inventory_level(
        &self,
        inventory_item_id: i64,
        location_id: i64,
        available: i64,
    ) -> ClientResult<()> {
        let path = "inventory_levels/set.json";
        let endpoint = format!("POST {path}");
        let url = join(&self.base_url, path)?;
        let body = InventorySet {
            location_id,
            inventory_item_id,
            available,
        };
        let resp = send_with_retry(&self.retry, &endpoint, Idempotency::NonIdempotent, || {
            self.http
                .post(url.clone())
                .header(TOKEN_HEADER, self.token.clone())
                .json(&body)
                .send()
        })
        .await?;
        let _: serde_json::Value = read_json(&endpoint, resp).await?;
        debug!(inventory_item_id, location_id, available, "Commerce inventory level set");
        Ok(())
    }

    async fn list_locations(&self) -> ClientResult<Vec<NamedResource>> {
        let locations: Locations = self.get_json("locations.json", &[]).await?;
        Ok(locations.locations)
    }
}
