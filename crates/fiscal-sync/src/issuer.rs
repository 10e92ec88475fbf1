//! # Fiscal Document Issuer
//!
//! Builds and submits document requests for one shop.
//!
//! ## Per-Type Requirements
//! ```text
//! ┌──────────────┬──────────────────────┬──────────────────────────────────┐
//! │ Type         │ Tax ID               │ Client block                     │
//! ├──────────────┼──────────────────────┼──────────────────────────────────┤
//! │ receipt      │ optional             │ code, names, email               │
//! │ invoice      │ valid, mandatory     │ full (company, activity, address │
//! │              │                      │ required; city, phone if known)  │
//! │ sales_note   │ optional             │ code, names, email               │
//! │ credit_note  │ optional             │ code, names, email + reference   │
//! └──────────────┴──────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Every requirement is checked before the fiscal service is called, so a
//! request that cannot succeed never leaves the process.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use fiscal_core::catalog::match_document_type_ids;
use fiscal_core::transform::NormalizedOrder;
use fiscal_core::{CoreError, DocumentType, Shop, ValidationError};

use crate::clients::{DocumentClient, DocumentDetail, DocumentRequest, FiscalApi};
use crate::error::{SyncError, SyncResult};
use crate::mapper::MappedLine;

/// The original document a credit note compensates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditReference {
    pub fiscal_document_id: i64,
    pub number: Option<i64>,
    pub tax_code: i64,
}

/// Outcome of a successful issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedDocumentRef {
    pub document_type: DocumentType,
    pub fiscal_document_id: i64,
    pub number: Option<i64>,
    pub tax_code: i64,
}

/// Issues documents through one shop's fiscal client.
#[derive(Clone)]
pub struct DocumentIssuer {
    fiscal: Arc<dyn FiscalApi>,
}

impl DocumentIssuer {
    pub fn new(fiscal: Arc<dyn FiscalApi>) -> Self {
        DocumentIssuer { fiscal }
    }

    /// Issues a receipt, invoice or sales note for an order.
    ///
    /// ## Errors
    /// - [`CoreError::UnsupportedDocumentType`] for credit notes
    /// - [`CoreError::TaxIdRequired`] / [`ValidationError::Required`] for an
    ///   incomplete invoice
    /// - [`SyncError::Config`] when the shop lacks a type id or branch
    /// - [`SyncError::Client`] when the fiscal service rejects the request
    pub async fn issue(
        &self,
        shop: &Shop,
        document_type: DocumentType,
        order: &NormalizedOrder,
        lines: &[MappedLine],
    ) -> SyncResult<IssuedDocumentRef> {
        if document_type == DocumentType::CreditNote {
            return Err(CoreError::UnsupportedDocumentType(document_type).into());
        }

        let request = build_request(shop, document_type, order, lines, None, Utc::now())?;
        self.submit(shop, order, document_type, &request).await
    }

    /// Issues a credit note compensating `reference`.
    pub async fn issue_credit_note(
        &self,
        shop: &Shop,
        order: &NormalizedOrder,
        lines: &[MappedLine],
        reference: &CreditReference,
    ) -> SyncResult<IssuedDocumentRef> {
        let request = build_request(
            shop,
            DocumentType::CreditNote,
            order,
            lines,
            Some(reference),
            Utc::now(),
        )?;
        self.submit(shop, order, DocumentType::CreditNote, &request).await
    }

    async fn submit(
        &self,
        shop: &Shop,
        order: &NormalizedOrder,
        document_type: DocumentType,
        request: &DocumentRequest,
    ) -> SyncResult<IssuedDocumentRef> {
        let issued = self.fiscal.create_document(request).await?;

        info!(
            shop_id = %shop.id,
            order_id = order.order_id,
            document_type = %document_type,
            fiscal_document_id = issued.id,
            number = ?issued.number,
            "Document issued"
        );

        Ok(IssuedDocumentRef {
            document_type,
            fiscal_document_id: issued.id,
            number: issued.number,
            tax_code: issued.tax_code.unwrap_or_else(|| document_type.tax_code()),
        })
    }
}

/// Proposes a `document class → type id` map from the service catalog.
///
/// Setup aid only: issuance reads the map saved in the shop settings.
pub async fn discover_document_type_ids(
    fiscal: &dyn FiscalApi,
) -> SyncResult<BTreeMap<DocumentType, i64>> {
    let catalog = fiscal.list_document_types().await?;
    Ok(match_document_type_ids(&catalog))
}

fn required(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Builds the wire request, checking every precondition.
pub fn build_request(
    shop: &Shop,
    document_type: DocumentType,
    order: &NormalizedOrder,
    lines: &[MappedLine],
    reference: Option<&CreditReference>,
    emitted_at: DateTime<Utc>,
) -> SyncResult<DocumentRequest> {
    let client = match document_type {
        DocumentType::Invoice => {
            if !order.has_tax_id() {
                return Err(CoreError::TaxIdRequired { document_type }.into());
            }
            required("customer.company", &order.company)?;
            required("customer.activity", &order.activity)?;
            required("customer.address", &order.address)?;

            DocumentClient {
                code: order.tax_id.clone(),
                first_name: order.first_name.clone(),
                last_name: order.last_name.clone(),
                email: order.email.clone(),
                company: order.company.clone(),
                activity: order.activity.clone(),
                address: order.address.clone(),
                city: order.city.clone(),
                phone: order.phone.clone(),
            }
        }
        DocumentType::Receipt | DocumentType::SalesNote | DocumentType::CreditNote => {
            DocumentClient {
                code: order.tax_id.clone(),
                first_name: order.first_name.clone(),
                last_name: order.last_name.clone(),
                email: order.email.clone(),
                ..Default::default()
            }
        }
    };

    let (note, reference_number, sii_code) = match (document_type, reference) {
        (DocumentType::CreditNote, Some(reference)) => {
            let number = reference.number.ok_or(CoreError::MissingReference)?;
            (
                format!("Refund for Shopify Order: {}", order.order_name),
                Some(number),
                Some(reference.tax_code),
            )
        }
        (DocumentType::CreditNote, None) => return Err(CoreError::MissingReference.into()),
        _ => (format!("Shopify Order: {}", order.order_name), None, None),
    };

    let document_type_id = shop
        .settings
        .document_type_ids
        .get(&document_type)
        .copied()
        .ok_or_else(|| {
            SyncError::Config(format!("no document type id configured for {document_type}"))
        })?;
    let branch_id = shop
        .fiscal_branch_id
        .ok_or_else(|| SyncError::Config("no fiscal branch configured".to_string()))?;

    let details = lines
        .iter()
        .map(|line| DocumentDetail {
            variant_id: line.fiscal_id,
            quantity: line.quantity,
            unit_price: line.unit_price.to_major_f64(),
            discount: line.discount_percent(),
            comment: line.comment.clone(),
        })
        .collect();

    Ok(DocumentRequest {
        document_type_id,
        branch_id,
        emission_date: emitted_at.timestamp(),
        client,
        details,
        note,
        reference: reference_number,
        sii_code,
    })
}
