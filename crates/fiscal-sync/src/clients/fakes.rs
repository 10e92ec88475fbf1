//! # In-Memory Client Doubles
//!
//! Fakes of [`FiscalApi`] and [`CommerceApi`] for pipeline tests. Both keep
//! their state behind a tokio mutex and can be told to fail every call with
//! a given HTTP status.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use fiscal_core::catalog::CatalogDocumentType;
use fiscal_core::{CommerceOrder, Shop};

use super::{
    ClientFactory, CommerceApi, CommerceVariant, DocumentRequest, FiscalApi, IssuedDocument,
    NamedResource, RemoteDocument,
};
use crate::error::{ClientError, ClientResult, SyncResult};

fn injected(endpoint: &str, status: Option<u16>) -> ClientResult<()> {
    match status {
        Some(status) => Err(ClientError::ApiError {
            endpoint: endpoint.to_string(),
            status,
            body: "injected failure".to_string(),
        }),
        None => Ok(()),
    }
}

// =============================================================================
// Fake Fiscal Service
// =============================================================================

#[derive(Debug, Default)]
struct FiscalState {
    document_types: Vec<CatalogDocumentType>,
    created: Vec<DocumentRequest>,
    documents: HashMap<i64, RemoteDocument>,
    stock: HashMap<i64, i64>,
    stock_writes: Vec<(i64, i64, i64)>,
    branches: Vec<NamedResource>,
    warehouses: Vec<NamedResource>,
    next_id: i64,
    next_number: i64,
    issued_tax_code: Option<i64>,
    fail_status: Option<u16>,
}

/// In-memory fiscal service.
#[derive(Debug, Default)]
pub struct FakeFiscal {
    state: Mutex<FiscalState>,
}

impl FakeFiscal {
    pub fn new() -> Self {
        FakeFiscal {
            state: Mutex::new(FiscalState {
                next_id: 500,
                next_number: 1000,
                ..Default::default()
            }),
        }
    }

    /// Every subsequent call fails with `status` until cleared.
    pub async fn fail_with_status(&self, status: u16) {
        self.state.lock().await.fail_status = Some(status);
    }

    pub async fn clear_failure(&self) {
        self.state.lock().await.fail_status = None;
    }

    /// Created documents report `code` as their tax code.
    pub async fn echo_tax_code(&self, code: i64) {
        self.state.lock().await.issued_tax_code = Some(code);
    }

    pub async fn set_document_types(&self, types: Vec<CatalogDocumentType>) {
        self.state.lock().await.document_types = types;
    }

    pub async fn set_stock(&self, variant_id: i64, quantity: i64) {
        self.state.lock().await.stock.insert(variant_id, quantity);
    }

    pub async fn stock_of(&self, variant_id: i64) -> Option<i64> {
        self.state.lock().await.stock.get(&variant_id).copied()
    }

    /// Every document request received, in order.
    pub async fn created(&self) -> Vec<DocumentRequest> {
        self.state.lock().await.created.clone()
    }

    /// Every `(variant, warehouse, quantity)` stock write received.
    pub async fn stock_writes(&self) -> Vec<(i64, i64, i64)> {
        self.state.lock().await.stock_writes.clone()
    }
}

#[async_trait]
impl FiscalApi for FakeFiscal {
    async fn list_document_types(&self) -> ClientResult<Vec<CatalogDocumentType>> {
        let state = self.state.lock().await;
        injected("GET document_types.json", state.fail_status)?;
        Ok(state.document_types.clone())
    }

    async fn create_document(&self, request: &DocumentRequest) -> ClientResult<IssuedDocument> {
        let mut state = self.state.lock().await;
        injected("POST documents.json", state.fail_status)?;

        state.next_id += 1;
        state.next_number += 1;
        let issued = IssuedDocument {
            id: state.next_id,
            number: Some(state.next_number),
            tax_code: state.issued_tax_code,
        };
        state.created.push(request.clone());
        state.documents.insert(
            issued.id,
            RemoteDocument {
                id: issued.id,
                number: issued.number,
                total_amount: None,
                state: Some(0),
            },
        );
        Ok(issued)
    }

    async fn get_document(&self, id: i64) -> ClientResult<RemoteDocument> {
        let state = self.state.lock().await;
        let endpoint = format!("GET documents/{id}.json");
        injected(&endpoint, state.fail_status)?;
        state.documents.get(&id).cloned().ok_or(ClientError::ApiError {
            endpoint,
            status: 404,
            body: "not found".to_string(),
        })
    }

    async fn get_document_pdf(&self, id: i64) -> ClientResult<Vec<u8>> {
        self.get_document(id).await?;
        Ok(format!("%PDF-fake-{id}").into_bytes())
    }

    async fn get_stock(&self, variant_id: i64, _warehouse_id: Option<i64>) -> ClientResult<Option<i64>> {
        let state = self.state.lock().await;
        injected("GET stocks.json", state.fail_status)?;
        Ok(state.stock.get(&variant_id).copied())
    }

    async fn set_stock(&self, variant_id: i64, warehouse_id: i64, quantity: i64) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        injected("POST stocks.json", state.fail_status)?;
        state.stock.insert(variant_id, quantity);
        state.stock_writes.push((variant_id, warehouse_id, quantity));
        Ok(())
    }

    async fn list_branches(&self) -> ClientResult<Vec<NamedResource>> {
        let state = self.state.lock().await;
        injected("GET branches.json", state.fail_status)?;
        Ok(state.branches.clone())
    }

    async fn list_warehouses(&self, _branch_id: Option<i64>) -> ClientResult<Vec<NamedResource>> {
        let state = self.state.lock().await;
        injected("GET warehouses.json", state.fail_status)?;
        Ok(state.warehouses.clone())
    }
}

// =============================================================================
// Fake Commerce Platform
// =============================================================================

#[derive(Debug, Default)]
struct CommerceState {
    orders: HashMap<i64, CommerceOrder>,
    variants: HashMap<i64, CommerceVariant>,
    levels: HashMap<(i64, i64), i64>,
    level_writes: Vec<(i64, i64, i64)>,
    locations: Vec<NamedResource>,
    fail_status: Option<u16>,
}

/// In-memory commerce platform.
#[derive(Debug, Default)]
pub struct FakeCommerce {
    state: Mutex<CommerceState>,
}

impl FakeCommerce {
    pub fn new() -> Self {
        FakeCommerce::default()
    }

    pub async fn fail_with_status(&self, status: u16) {
        self.state.lock().await.fail_status = Some(status);
    }

    pub async fn clear_failure(&self) {
        self.state.lock().await.fail_status = None;
    }

    pub async fn add_order(&self, order: CommerceOrder) {
        self.state.lock().await.orders.insert(order.id, order);
    }

    pub async fn add_variant(&self, variant: CommerceVariant) {
        self.state.lock().await.variants.insert(variant.id, variant);
    }

    pub async fn add_location(&self, id: i64, name: &str) {
        self.state.lock().await.locations.push(NamedResource {
            id,
            name: name.to_string(),
        });
    }

    pub async fn set_level(&self, inventory_item_id: i64, location_id: i64, available: i64) {
        self.state
            .lock()
            .await
            .levels
            .insert((inventory_item_id, location_id), available);
    }

    pub async fn level_of(&self, inventory_item_id: i64, location_id: i64) -> Option<i64> {
        self.state
            .lock()
            .await
            .levels
            .get(&(inventory_item_id, location_id))
            .copied()
    }

    /// Every `(item, location, available)` write received.
    pub async fn level_writes(&self) -> Vec<(i64, i64, i64)> {
        self.state.lock().await.level_writes.clone()
    }
}

#[async_trait]
impl CommerceApi for FakeCommerce {
    async fn get_order(&self, order_id: i64) -> ClientResult<CommerceOrder> {
        let state = self.state.lock().await;
        let endpoint = format!("GET orders/{order_id}.json");
        injected(&endpoint, state.fail_status)?;
        state.orders.get(&order_id).cloned().ok_or(ClientError::ApiError {
            endpoint,
            status: 404,
            body: "Not Found".to_string(),
        })
    }

    async fn get_variant(&self, variant_id: i64) -> ClientResult<CommerceVariant> {
        let state = self.state.lock().await;
        let endpoint = format!("GET variants/{variant_id}.json");
        injected(&endpoint, state.fail_status)?;
        state.variants.get(&variant_id).cloned().ok_or(ClientError::ApiError {
            endpoint,
            status: 404,
            body: "Not Found".to_string(),
        })
    }

    async fn get_inventory_level(
        &self,
        inventory_item_id: i64,
        location_id: i64,
    ) -> ClientResult<Option<i64>> {
        let state = self.state.lock().await;
        injected("GET inventory_levels.json", state.fail_status)?;
        Ok(state.levels.get(&(inventory_item_id, location_id)).copied())
    }

    async fn set_inventory_level(
        &self,
        inventory_item_id: i64,
        location_id: i64,
        available: i64,
    ) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        injected("POST inventory_levels/set.json", state.fail_status)?;
        state.levels.insert((inventory_item_id, location_id), available);
        state
            .level_writes
            .push((inventory_item_id, location_id, available));
        Ok(())
    }

    async fn list_locations(&self) -> ClientResult<Vec<NamedResource>> {
        let state = self.state.lock().await;
        injected("GET locations.json", state.fail_status)?;
        Ok(state.locations.clone())
    }
}

// =============================================================================
// Fake Factory
// =============================================================================

/// Hands the same pair of fakes to every shop.
#[derive(Debug, Clone)]
pub struct FakeClientFactory {
    pub fiscal: Arc<FakeFiscal>,
    pub commerce: Arc<FakeCommerce>,
}

impl FakeClientFactory {
    pub fn new() -> Self {
        FakeClientFactory {
            fiscal: Arc::new(FakeFiscal::new()),
            commerce: Arc::new(FakeCommerce::new()),
        }
    }
}

impl Default for FakeClientFactory {
    fn default() -> Self {
        FakeClientFactory::new()
    }
}

impl ClientFactory for FakeClientFactory {
    fn fiscal(&self, _shop: &Shop) -> SyncResult<Arc<dyn FiscalApi>> {
        Ok(self.fiscal.clone())
    }

    fn commerce(&self, _shop: &Shop) -> SyncResult<Arc<dyn CommerceApi>> {
        Ok(self.commerce.clone())
    }
}
