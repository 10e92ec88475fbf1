//! # Document Type Catalog Discovery
//!
//! Proposes a `document class → fiscal type id` map from the fiscal
//! service's document type catalog. This is a one-time setup aid: issuance
//! itself only reads the explicit map stored in [`crate::ShopSettings`].
//!
//! Matching per class: tax code first, then a name keyword. Names are
//! locale-dependent, so every proposal should be reviewed before saving.

use std::collections::BTreeMap;

use crate::types::DocumentType;

/// One entry of the fiscal service's document type catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDocumentType {
    pub id: i64,
    pub name: String,
    pub tax_code: Option<i64>,
}

fn name_keyword(doc_type: DocumentType) -> &'static str {
    match doc_type {
        DocumentType::Receipt => "boleta",
        DocumentType::Invoice => "factura",
        DocumentType::SalesNote => "nota de venta",
        DocumentType::CreditNote => "nota de cr",
    }
}

/// Matches each document class against `catalog`.
///
/// Classes with no match are absent from the result.
pub fn match_document_type_ids(catalog: &[CatalogDocumentType]) -> BTreeMap<DocumentType, i64> {
    let mut proposal = BTreeMap::new();

    for doc_type in DocumentType::ALL {
        let by_code = catalog
            .iter()
            .find(|entry| entry.tax_code == Some(doc_type.tax_code()));

        let by_name = || {
            let keyword = name_keyword(doc_type);
            catalog.iter().find(|entry| {
                let name = entry.name.to_lowercase();
                // "nota de crédito ... factura" must not be taken as an invoice
                name.contains(keyword)
                    && (doc_type == DocumentType::CreditNote || !name.contains("nota de cr"))
            })
        };

        if let Some(entry) = by_code.or_else(by_name) {
            proposal.insert(doc_type, entry.id);
        }
    }

    proposal
}
